//! # Standard Rules
//!
//! Built-in advertising and service-health rules. Thresholds are expressed
//! relative to per-product facts (`target_cpa`, `daily_budget`) so a single
//! global rule set serves every product.
//!
//! | Rule | Priority | Fires when | Action |
//! |------|----------|------------|--------|
//! | `ads.learning_phase_protection` | 200 | campaign is learning | `hold` (blocks campaign changes) |
//! | `ads.three_x_kill` | 100 | spend ≥ 3 × target CPA, no conversions | `pause` |
//! | `ads.scale_winner` | 50 | CPA < 80% of target, ≥ 10 conversions | `scale_20pct` |
//! | `ads.roas_threshold` | 40 | ROAS < 1.0 after $100 spend | `alert` |
//! | `ads.creative_fatigue` | 30 | frequency > 4 | `alert` |
//! | `ads.ctr_drop` | 25 | CTR < 1% after 1000 impressions | `alert` |
//! | `ads.budget_pacing` | 20 | today's spend > 80% of daily budget | `alert` |
//! | `health.error_spike_rollback` | 90 | error rate ≥ 5% | `rollback` (approval) |
//! | `health.latency_critical` | 70 | p95 ≥ 5000 ms | `alert` |
//! | `health.uptime_breach` | 65 | uptime < 99.9% | `alert` |
//! | `health.error_rate_warning` | 60 | error rate ≥ 1% | `notify` |
//! | `health.latency_warning` | 55 | p95 ≥ 2000 ms | `notify` |

use serde_json::json;
use vos_core::{event_types, ActionKind};

use crate::rule::{ActionTemplate, RuleDef};

const ADS_TRIGGERS: [&str; 3] = [
    event_types::ADS_OPTIMIZATION,
    "marketing.*",
    event_types::FACTS_UPDATED,
];

const HEALTH_TRIGGERS: [&str; 3] = [
    event_types::HEALTH_CHECK,
    "monitoring.*",
    event_types::FACTS_UPDATED,
];

fn alert(alert_type: &str, message: &str) -> ActionTemplate {
    ActionTemplate::new(ActionKind::Alert)
        .with_target(format!("alerts:{{product_id}}:{alert_type}"))
        .with_parameter("alert_type", json!(alert_type))
        .with_parameter("message", json!(message))
}

fn notify(topic: &str, message: &str) -> ActionTemplate {
    ActionTemplate::new(ActionKind::Notify)
        .with_target(format!("notify:{{product_id}}:{topic}"))
        .with_parameter("severity", json!("warning"))
        .with_parameter("message", json!(message))
}

/// Paid-advertising rules. The learning-phase hold shares the campaign-control
/// conflict class, so it outranks every pause and scale for the product.
pub fn ads_rules() -> Vec<RuleDef> {
    vec![
        RuleDef::new(
            "ads.learning_phase_protection",
            "in_learning_phase",
            ActionTemplate::new(ActionKind::Hold)
                .with_target("ad_platform:{product_id}")
                .with_parameter("reason", json!("Campaign in learning phase - changes blocked")),
        )
        .with_name("Learning Phase Protection")
        .with_description("Block campaign modifications while the platform is still learning")
        .with_priority(200),
        RuleDef::new(
            "ads.three_x_kill",
            "spend >= 3 * target_cpa AND conversions == 0",
            ActionTemplate::new(ActionKind::Pause)
                .with_parameter("reason", json!("3x Kill Rule - no conversions")),
        )
        .with_name("3x Kill Rule")
        .with_description("Pause once spend reaches three times the target CPA with no conversions")
        .with_priority(100),
        RuleDef::new(
            "ads.scale_winner",
            "cpa < 0.8 * target_cpa AND conversions >= 10",
            ActionTemplate::new(ActionKind::Scale20Pct).with_parameter("increase_percent", json!(20)),
        )
        .with_name("20% Scale Rule")
        .with_description("Scale budget by 20% when CPA is at least 20% under target")
        .with_priority(50),
        RuleDef::new(
            "ads.roas_threshold",
            "spend >= $100 AND roas < 1.0",
            alert("low_roas", "ROAS below breakeven - review campaign"),
        )
        .with_name("Low ROAS Alert")
        .with_priority(40),
        RuleDef::new(
            "ads.creative_fatigue",
            "frequency > 4.0",
            alert(
                "creative_fatigue",
                "Creative fatigue detected - consider refreshing ad creative",
            ),
        )
        .with_name("Creative Fatigue Alert")
        .with_priority(30),
        RuleDef::new(
            "ads.ctr_drop",
            "impressions >= 1000 AND ctr < 0.01",
            alert("low_ctr", "CTR below minimum threshold - review ad creative"),
        )
        .with_name("Low CTR Alert")
        .with_priority(25),
        RuleDef::new(
            "ads.budget_pacing",
            "spend_today > 0.8 * daily_budget",
            alert("budget_pacing", "Approaching daily budget limit"),
        )
        .with_name("Budget Pacing Alert")
        .with_priority(20),
    ]
    .into_iter()
    .map(|def| def.with_triggers(ADS_TRIGGERS))
    .collect()
}

/// Service-health rules.
pub fn health_rules() -> Vec<RuleDef> {
    vec![
        RuleDef::new(
            "health.error_spike_rollback",
            "error_rate >= 5.0",
            ActionTemplate::new(ActionKind::Rollback)
                .with_parameter("reason", json!("Error rate above critical threshold")),
        )
        .with_name("Error Spike Rollback")
        .with_priority(90),
        RuleDef::new(
            "health.latency_critical",
            "response_time_p95 >= 5000",
            alert("latency", "P95 response time above critical threshold"),
        )
        .with_name("Critical Latency")
        .with_priority(70),
        RuleDef::new(
            "health.uptime_breach",
            "uptime < 99.9",
            alert("uptime", "Uptime below SLA"),
        )
        .with_name("Uptime Below SLA")
        .with_priority(65),
        RuleDef::new(
            "health.error_rate_warning",
            "error_rate >= 1.0",
            notify("error_rate", "Error rate above warning threshold"),
        )
        .with_name("Elevated Error Rate")
        .with_priority(60),
        RuleDef::new(
            "health.latency_warning",
            "response_time_p95 >= 2000",
            notify("latency", "P95 response time above warning threshold"),
        )
        .with_name("Elevated Latency")
        .with_priority(55),
    ]
    .into_iter()
    .map(|def| def.with_triggers(HEALTH_TRIGGERS))
    .collect()
}

/// All built-in rules.
pub fn standard_rules() -> Vec<RuleDef> {
    let mut rules = ads_rules();
    rules.extend(health_rules());
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use vos_facts::FactSchema;

    #[test]
    fn every_standard_rule_compiles() {
        let schema = FactSchema::standard();
        for def in standard_rules() {
            let id = def.id.clone();
            assert!(Rule::compile(def, &schema).is_ok(), "{id} failed to compile");
        }
    }

    #[test]
    fn rule_ids_are_unique() {
        let mut ids: Vec<String> = standard_rules().into_iter().map(|d| d.id).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn high_impact_rules_need_approval_by_default() {
        let gated: Vec<String> = standard_rules()
            .into_iter()
            .filter(|d| d.action.requires_approval())
            .map(|d| d.id)
            .collect();
        assert_eq!(
            gated,
            vec!["ads.scale_winner".to_string(), "health.error_spike_rollback".to_string()]
        );
    }

    #[test]
    fn standard_rules_round_trip_through_yaml() {
        let defs = standard_rules();
        let yaml = serde_yaml::to_string(&defs).unwrap();
        let back: Vec<RuleDef> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, defs);
    }
}
