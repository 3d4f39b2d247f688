use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::common::channel_matches;
use crate::domain::condition::{
    AdjustmentMethod, ConditionKeyType, ConditionRule, ConditionSet, ConflictStrategy,
};
use crate::domain::quote::{ComponentKind, CustomerKeys, QuoteComponent, QuoteRequest};
use crate::errors::EngineError;

/// Condition components plus the running subtotal after they were applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub components: Vec<QuoteComponent>,
    pub subtotal: Decimal,
}

/// Matches condition rules against a request and applies them over a running
/// subtotal. Within a set, non-stackable rules compete under the set's
/// conflict strategy; stackable rules always apply after the winner. Sets do
/// not compete with each other: every qualifying set contributes.
pub struct ConditionEngine;

impl ConditionEngine {
    pub fn apply(
        request: &QuoteRequest,
        keys: &CustomerKeys,
        sets: &[ConditionSet],
        base_amount: Decimal,
        commodity: Option<&str>,
        price_date: DateTime<Utc>,
    ) -> Result<ConditionOutcome, EngineError> {
        let mut matched: Vec<&ConditionSet> = sets
            .iter()
            .filter(|set| {
                set.active
                    && set.window.covers(price_date)
                    && channel_matches(set.channel, request.channel)
                    && Self::key_matches(set, keys)
            })
            .collect();
        // Priority descending, then most recent valid_from, then key. A full
        // tie keeps this deterministic order but is worth investigating.
        matched.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.window.valid_from.cmp(&a.window.valid_from))
                .then_with(|| a.key.cmp(&b.key))
        });

        // Sets whose rules all fail the rule-level filters contribute nothing,
        // so they neither apply nor count towards an ordering tie.
        let contributing: Vec<(&ConditionSet, Vec<(usize, &ConditionRule)>)> = matched
            .into_iter()
            .filter_map(|set| {
                let rules: Vec<(usize, &ConditionRule)> = set
                    .rules
                    .iter()
                    .enumerate()
                    .filter(|(_, rule)| {
                        rule.scope.matches(&request.sku, commodity)
                            && rule.quantity_in_band(request.quantity)
                            && channel_matches(rule.channel, request.channel)
                            && rule.window.covers(price_date)
                    })
                    .collect();
                (!rules.is_empty()).then_some((set, rules))
            })
            .collect();
        for pair in contributing.windows(2) {
            if pair[0].0.priority == pair[1].0.priority
                && pair[0].0.window.valid_from == pair[1].0.window.valid_from
            {
                warn!(
                    first = %pair[0].0.key,
                    second = %pair[1].0.key,
                    "condition sets tie on priority and valid_from; applying in key order"
                );
            }
        }

        let quantity = Decimal::from(request.quantity);
        let mut subtotal = base_amount;
        let mut last_component_key = "base".to_string();
        let mut components = Vec::new();

        for (set, rules) in contributing {
            let (competitors, stackable): (Vec<_>, Vec<_>) =
                rules.into_iter().partition(|(_, rule)| !rule.stackable);
            let winners = Self::select_winners(set, &competitors, subtotal, quantity);

            for (_, rule) in winners.into_iter().chain(stackable) {
                let basis = match rule.method {
                    AdjustmentMethod::Pct => subtotal,
                    AdjustmentMethod::Abs => quantity,
                };
                let amount = Self::adjustment(rule, subtotal, quantity);
                subtotal += amount;
                if subtotal <= Decimal::ZERO {
                    return Err(EngineError::validation(format!(
                        "condition rule `{}:{}` drives the subtotal to {subtotal}; quotes must stay positive",
                        set.key, rule.key
                    )));
                }

                let key = format!("condition:{}:{}", set.key, rule.key);
                debug!(rule = %key, amount = %amount, subtotal = %subtotal, "condition applied");
                components.push(QuoteComponent {
                    key: key.clone(),
                    kind: ComponentKind::Condition,
                    description: format!("{:?} {:?}", rule.rule_type, rule.method),
                    rate: Some(rule.value),
                    basis: Some(basis),
                    amount,
                    calculated_from: Some(last_component_key.clone()),
                    capped_value: None,
                });
                last_component_key = key;
            }
        }

        Ok(ConditionOutcome { components, subtotal })
    }

    fn key_matches(set: &ConditionSet, keys: &CustomerKeys) -> bool {
        match set.key_type {
            ConditionKeyType::Customer => set.key_value == keys.customer_id.0,
            ConditionKeyType::Segment => Some(set.key_value.as_str()) == keys.segment.as_deref(),
            ConditionKeyType::Region => Some(set.key_value.as_str()) == keys.region.as_deref(),
            ConditionKeyType::PaymentTerm => {
                Some(set.key_value.as_str()) == keys.payment_term.as_deref()
            }
        }
    }

    /// Reduce the non-stackable matching rules of one set to the rules that
    /// will actually apply, per the set's strategy. Magnitudes for
    /// `MaxWins`/`MinWins` are measured against the subtotal at set entry so
    /// the choice is independent of application order inside the set.
    fn select_winners<'a>(
        set: &ConditionSet,
        competitors: &[(usize, &'a ConditionRule)],
        entry_subtotal: Decimal,
        quantity: Decimal,
    ) -> Vec<(usize, &'a ConditionRule)> {
        if competitors.is_empty() {
            return Vec::new();
        }

        let mut ordered: Vec<(usize, &ConditionRule)> = competitors.to_vec();
        // Rule priority descending, declaration order as the stable tiebreak.
        ordered.sort_by(|(index_a, a), (index_b, b)| {
            b.priority.cmp(&a.priority).then_with(|| index_a.cmp(index_b))
        });

        match set.strategy {
            ConflictStrategy::Stack => ordered,
            ConflictStrategy::FirstWins => vec![ordered[0]],
            ConflictStrategy::LastWins => vec![ordered[ordered.len() - 1]],
            ConflictStrategy::MaxWins | ConflictStrategy::MinWins => {
                let mut best = ordered[0];
                let mut best_magnitude =
                    Self::adjustment(best.1, entry_subtotal, quantity).abs();
                let mut ambiguous = false;
                for candidate in &ordered[1..] {
                    let magnitude =
                        Self::adjustment(candidate.1, entry_subtotal, quantity).abs();
                    let wins = match set.strategy {
                        ConflictStrategy::MaxWins => magnitude > best_magnitude,
                        _ => magnitude < best_magnitude,
                    };
                    if magnitude == best_magnitude {
                        // Earliest declared rule keeps the win on a tie.
                        ambiguous = true;
                    }
                    if wins {
                        best = *candidate;
                        best_magnitude = magnitude;
                        ambiguous = false;
                    }
                }
                if ambiguous {
                    warn!(
                        set = %set.key,
                        winner = %best.1.key,
                        strategy = ?set.strategy,
                        "conflict strategy tie on adjustment magnitude; keeping earliest declared rule"
                    );
                }
                vec![best]
            }
        }
    }

    fn adjustment(rule: &ConditionRule, subtotal: Decimal, quantity: Decimal) -> Decimal {
        let magnitude = match rule.method {
            AdjustmentMethod::Abs => rule.value * quantity,
            AdjustmentMethod::Pct => subtotal * rule.value / Decimal::ONE_HUNDRED,
        };
        rule.rule_type.sign() * magnitude
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::ConditionEngine;
    use crate::domain::common::{CustomerId, TenantId, ValidityWindow};
    use crate::domain::condition::{
        AdjustmentMethod, ConditionKeyType, ConditionRule, ConditionSet, ConflictStrategy,
        RuleScope, RuleType,
    };
    use crate::domain::quote::{CustomerKeys, QuoteRequest};

    fn request(quantity: u32) -> QuoteRequest {
        QuoteRequest {
            tenant: TenantId("acme".to_string()),
            customer_id: CustomerId("cust-1".to_string()),
            sku: "STL-COIL".to_string(),
            quantity,
            uom: None,
            channel: None,
            price_date: None,
            context: BTreeMap::new(),
            requested_by: None,
        }
    }

    fn keys() -> CustomerKeys {
        CustomerKeys {
            customer_id: CustomerId("cust-1".to_string()),
            segment: Some("enterprise".to_string()),
            region: Some("DE".to_string()),
            payment_term: Some("net30".to_string()),
        }
    }

    fn rule(key: &str, rule_type: RuleType, method: AdjustmentMethod, value: i64) -> ConditionRule {
        ConditionRule {
            key: key.to_string(),
            rule_type,
            method,
            value: Decimal::new(value, 0),
            scope: RuleScope::All,
            min_qty: None,
            max_qty: None,
            channel: None,
            stackable: false,
            priority: 0,
            window: ValidityWindow::open_from(Utc::now() - Duration::days(1)),
        }
    }

    fn set(key: &str, strategy: ConflictStrategy, rules: Vec<ConditionRule>) -> ConditionSet {
        ConditionSet {
            key: key.to_string(),
            tenant: TenantId("acme".to_string()),
            key_type: ConditionKeyType::Customer,
            key_value: "cust-1".to_string(),
            channel: None,
            strategy,
            priority: 0,
            active: true,
            window: ValidityWindow::open_from(Utc::now() - Duration::days(1)),
            rules,
        }
    }

    #[test]
    fn five_percent_discount_on_the_reference_base() {
        let sets = vec![set(
            "cs-vip",
            ConflictStrategy::FirstWins,
            vec![rule("vip", RuleType::Discount, AdjustmentMethod::Pct, 5)],
        )];

        let outcome = ConditionEngine::apply(
            &request(50),
            &keys(),
            &sets,
            Decimal::new(4_750, 0),
            Some("steel"),
            Utc::now(),
        )
        .expect("apply");

        assert_eq!(outcome.components.len(), 1);
        assert_eq!(outcome.components[0].amount, Decimal::new(-23_750, 2));
        assert_eq!(outcome.components[0].calculated_from.as_deref(), Some("base"));
        assert_eq!(outcome.subtotal, Decimal::new(451_250, 2));
    }

    #[test]
    fn first_and_last_wins_pick_by_declaration_order() {
        let rules = vec![
            rule("early", RuleType::Discount, AdjustmentMethod::Pct, 3),
            rule("late", RuleType::Discount, AdjustmentMethod::Pct, 7),
        ];
        let base = Decimal::new(1_000, 0);

        let first = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[set("cs", ConflictStrategy::FirstWins, rules.clone())],
            base,
            None,
            Utc::now(),
        )
        .expect("apply");
        assert_eq!(first.components[0].key, "condition:cs:early");

        let last = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[set("cs", ConflictStrategy::LastWins, rules)],
            base,
            None,
            Utc::now(),
        )
        .expect("apply");
        assert_eq!(last.components[0].key, "condition:cs:late");
    }

    #[test]
    fn max_and_min_wins_pick_by_absolute_adjustment() {
        // 4% of 1000 = 40 beats an absolute 2/unit * 10 = 20 under MaxWins;
        // MinWins picks the other way around.
        let rules = vec![
            rule("abs-small", RuleType::Surcharge, AdjustmentMethod::Abs, 2),
            rule("pct-large", RuleType::Discount, AdjustmentMethod::Pct, 4),
        ];
        let base = Decimal::new(1_000, 0);

        let max = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[set("cs", ConflictStrategy::MaxWins, rules.clone())],
            base,
            None,
            Utc::now(),
        )
        .expect("apply");
        assert_eq!(max.components[0].key, "condition:cs:pct-large");
        assert_eq!(max.components[0].amount, Decimal::new(-40, 0));

        let min = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[set("cs", ConflictStrategy::MinWins, rules)],
            base,
            None,
            Utc::now(),
        )
        .expect("apply");
        assert_eq!(min.components[0].key, "condition:cs:abs-small");
        assert_eq!(min.components[0].amount, Decimal::new(20, 0));
    }

    #[test]
    fn magnitude_tie_keeps_earliest_declared_rule() {
        // 5% of 1000 = 50 ties with an absolute 5/unit * 10 = 50.
        let rules = vec![
            rule("declared-first", RuleType::Discount, AdjustmentMethod::Pct, 5),
            rule("declared-second", RuleType::Discount, AdjustmentMethod::Abs, 5),
        ];
        let outcome = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[set("cs", ConflictStrategy::MaxWins, rules)],
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .expect("apply");
        assert_eq!(outcome.components[0].key, "condition:cs:declared-first");
    }

    #[test]
    fn stackable_rules_apply_in_addition_to_the_winner() {
        let mut freight = rule("freight", RuleType::Surcharge, AdjustmentMethod::Abs, 1);
        freight.stackable = true;
        let rules = vec![
            rule("small", RuleType::Discount, AdjustmentMethod::Pct, 2),
            rule("big", RuleType::Discount, AdjustmentMethod::Pct, 10),
            freight,
        ];

        let outcome = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[set("cs", ConflictStrategy::MaxWins, rules)],
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .expect("apply");

        assert_eq!(outcome.components.len(), 2);
        assert_eq!(outcome.components[0].key, "condition:cs:big");
        assert_eq!(outcome.components[1].key, "condition:cs:freight");
        // 1000 - 10% = 900, + 10 * 1/unit = 910.
        assert_eq!(outcome.subtotal, Decimal::new(910, 0));
    }

    #[test]
    fn percentage_rules_compound_over_the_running_subtotal() {
        let shared_window = ValidityWindow::open_from(Utc::now() - Duration::days(1));
        let segment_set = ConditionSet {
            key_type: ConditionKeyType::Segment,
            key_value: "enterprise".to_string(),
            window: shared_window.clone(),
            ..set(
                "cs-segment",
                ConflictStrategy::FirstWins,
                vec![rule("seg", RuleType::Discount, AdjustmentMethod::Pct, 10)],
            )
        };
        let customer_set = ConditionSet {
            window: shared_window,
            ..set(
                "cs-customer",
                ConflictStrategy::FirstWins,
                vec![rule("cust", RuleType::Discount, AdjustmentMethod::Pct, 10)],
            )
        };

        let outcome = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[segment_set, customer_set],
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .expect("apply");

        // Equal priority and valid_from fall through to key order, so
        // cs-customer applies first. 1000 - 10% = 900, then - 10% = 810,
        // not 800: the second percentage compounds on the running subtotal.
        assert_eq!(outcome.subtotal, Decimal::new(810, 0));
        assert_eq!(
            outcome.components[1].calculated_from.as_deref(),
            Some(outcome.components[0].key.as_str())
        );
    }

    #[test]
    fn set_priority_orders_application_across_sets() {
        let mut high = set(
            "z-high",
            ConflictStrategy::FirstWins,
            vec![rule("first", RuleType::Discount, AdjustmentMethod::Pct, 10)],
        );
        high.priority = 10;
        let low = set(
            "a-low",
            ConflictStrategy::FirstWins,
            vec![rule("second", RuleType::Discount, AdjustmentMethod::Pct, 10)],
        );

        let outcome = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[low, high],
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .expect("apply");
        assert_eq!(outcome.components[0].key, "condition:z-high:first");
    }

    #[test]
    fn inactive_expired_or_unmatched_sets_contribute_nothing() {
        let mut inactive = set(
            "cs-inactive",
            ConflictStrategy::FirstWins,
            vec![rule("r", RuleType::Discount, AdjustmentMethod::Pct, 5)],
        );
        inactive.active = false;

        let mut expired = set(
            "cs-expired",
            ConflictStrategy::FirstWins,
            vec![rule("r", RuleType::Discount, AdjustmentMethod::Pct, 5)],
        );
        expired.window = ValidityWindow {
            valid_from: Utc::now() - Duration::days(30),
            valid_to: Some(Utc::now() - Duration::days(1)),
        };

        let other_customer = ConditionSet {
            key_value: "cust-other".to_string(),
            ..set(
                "cs-other",
                ConflictStrategy::FirstWins,
                vec![rule("r", RuleType::Discount, AdjustmentMethod::Pct, 5)],
            )
        };

        let outcome = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[inactive, expired, other_customer],
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .expect("apply");
        assert!(outcome.components.is_empty());
        assert_eq!(outcome.subtotal, Decimal::new(1_000, 0));
    }

    #[test]
    fn quantity_band_filters_rules() {
        let mut banded = rule("bulk-only", RuleType::Discount, AdjustmentMethod::Pct, 5);
        banded.min_qty = Some(100);
        let sets = vec![set("cs", ConflictStrategy::FirstWins, vec![banded])];

        let outcome = ConditionEngine::apply(
            &request(10),
            &keys(),
            &sets,
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .expect("apply");
        assert!(outcome.components.is_empty());
    }

    #[test]
    fn tied_set_with_no_applicable_rules_leaves_the_other_unaffected() {
        let shared_window = ValidityWindow::open_from(Utc::now() - Duration::days(1));
        let mut bulk = rule("bulk-only", RuleType::Discount, AdjustmentMethod::Pct, 8);
        bulk.min_qty = Some(100);
        // Ties with cs-live on priority and valid_from but its only rule is
        // out of band, so the set drops out before ordering matters.
        let empty_set = ConditionSet {
            window: shared_window.clone(),
            ..set("cs-empty", ConflictStrategy::FirstWins, vec![bulk])
        };
        let live_set = ConditionSet {
            window: shared_window,
            ..set(
                "cs-live",
                ConflictStrategy::FirstWins,
                vec![rule("live", RuleType::Discount, AdjustmentMethod::Pct, 5)],
            )
        };

        let outcome = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[empty_set, live_set],
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .expect("apply");

        assert_eq!(outcome.components.len(), 1);
        assert_eq!(outcome.components[0].key, "condition:cs-live:live");
        assert_eq!(outcome.subtotal, Decimal::new(950, 0));
    }

    #[test]
    fn subtotal_driven_non_positive_is_rejected() {
        let rules = vec![
            rule("deep", RuleType::Discount, AdjustmentMethod::Abs, 200),
        ];
        let error = ConditionEngine::apply(
            &request(10),
            &keys(),
            &[set("cs", ConflictStrategy::FirstWins, rules)],
            Decimal::new(1_000, 0),
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(error.to_string().contains("stay positive"));
    }
}
