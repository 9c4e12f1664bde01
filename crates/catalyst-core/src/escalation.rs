//! Model escalation ladder (spec 4.1.10): retries climb to a stronger
//! model instead of repeating the same one.

use catalyst_types::ModelEscalationConfig;

const LADDER: &[&str] = &["haiku", "sonnet", "opus"];

/// The model a given attempt should run with.
///
/// `attempt` is 1-indexed (first attempt is 1). Every `escalate_after`
/// attempts climbs one rung on the ladder, and never past `max_model`.
/// Disabled or missing config always returns `base`.
pub fn effective_model(base: &str, attempt: u32, config: Option<&ModelEscalationConfig>) -> String {
    let Some(config) = config else {
        return base.to_string();
    };
    if !config.enabled {
        return base.to_string();
    }

    let base_idx = LADDER.iter().position(|m| *m == base).unwrap_or(0);
    let max_idx = LADDER
        .iter()
        .position(|m| *m == config.max_model)
        .unwrap_or(LADDER.len() - 1);

    let steps = (attempt - 1) / config.escalate_after.max(1);
    let target_idx = (base_idx + steps as usize).min(max_idx);

    LADDER[target_idx].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, escalate_after: u32, max_model: &str) -> ModelEscalationConfig {
        ModelEscalationConfig {
            enabled,
            escalate_after,
            max_model: max_model.to_string(),
            validation_model: "sonnet".to_string(),
            starting_model: "haiku".to_string(),
        }
    }

    #[test]
    fn no_config_returns_base() {
        assert_eq!(effective_model("sonnet", 5, None), "sonnet");
    }

    #[test]
    fn disabled_config_returns_base() {
        let c = config(false, 1, "opus");
        assert_eq!(effective_model("haiku", 5, Some(&c)), "haiku");
    }

    #[test]
    fn below_threshold_returns_base() {
        let c = config(true, 2, "opus");
        assert_eq!(effective_model("haiku", 2, Some(&c)), "haiku");
    }

    #[test]
    fn escalates_one_step_past_threshold() {
        let c = config(true, 1, "opus");
        assert_eq!(effective_model("haiku", 2, Some(&c)), "sonnet");
    }

    #[test]
    fn escalates_two_steps_past_threshold() {
        let c = config(true, 1, "opus");
        assert_eq!(effective_model("haiku", 3, Some(&c)), "opus");
    }

    #[test]
    fn never_escalates_past_max_model() {
        let c = config(true, 1, "sonnet");
        assert_eq!(effective_model("haiku", 10, Some(&c)), "sonnet");
    }

    #[test]
    fn unknown_base_model_treated_as_bottom_of_ladder() {
        let c = config(true, 1, "opus");
        assert_eq!(effective_model("custom-model", 2, Some(&c)), "sonnet");
    }

    #[test]
    fn escalate_after_two_climbs_one_rung_per_pair_of_attempts() {
        let c = config(true, 2, "opus");
        assert_eq!(effective_model("haiku", 1, Some(&c)), "haiku");
        assert_eq!(effective_model("haiku", 2, Some(&c)), "haiku");
        assert_eq!(effective_model("haiku", 3, Some(&c)), "sonnet");
        assert_eq!(effective_model("haiku", 4, Some(&c)), "sonnet");
        assert_eq!(effective_model("haiku", 5, Some(&c)), "opus");
        assert_eq!(effective_model("haiku", 6, Some(&c)), "opus");
    }
}
