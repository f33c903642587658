//! Risk-cost edge weights.

use crate::GraphError;
use crate::model::{EdgePatch, StreetGraph};

/// Attribute holding the risk-weighted edge cost.
pub const RISK_COST_ATTR: &str = "risk_cost";

/// Default risk amplification factor.
pub const DEFAULT_ALPHA: f64 = 3.0;

/// Computes `risk_cost = length * (1 + alpha * risk / max_risk)` for every
/// edge, reading `risk` from `risk_attr`.
///
/// Negative or unreadable risks count as zero and `max_risk` falls back to
/// `1.0` when every risk is zero, so `length <= risk_cost <= length * (1 +
/// alpha)` always holds.
#[must_use]
pub fn risk_cost_patch(graph: &StreetGraph, risk_attr: &str, alpha: f64) -> EdgePatch {
    let alpha = if alpha.is_finite() { alpha.max(0.0) } else { 0.0 };
    let risks: Vec<f64> = graph
        .edges()
        .map(|e| e.attribute_f64(risk_attr).max(0.0))
        .collect();

    let max_risk = risks.iter().copied().fold(0.0_f64, f64::max);
    let max_risk = if max_risk > 0.0 { max_risk } else { 1.0 };

    let mut patch = EdgePatch::new(RISK_COST_ATTR);
    for ((id, edge), risk) in graph.edges_with_ids().zip(risks) {
        let normalized = risk / max_risk;
        patch
            .values
            .insert(id, edge.length * alpha.mul_add(normalized, 1.0));
    }

    log::info!(
        "Computed {RISK_COST_ATTR} for {} edges from {risk_attr} (max risk {max_risk:e}, alpha {alpha})",
        patch.values.len()
    );
    patch
}

/// Returns a copy of `graph` with [`RISK_COST_ATTR`] written on every
/// edge, plus the name of that attribute for use as a search weight.
///
/// # Errors
///
/// Propagates [`StreetGraph::with_patch`] failures.
pub fn add_risk_cost_weights(
    graph: &StreetGraph,
    risk_attr: &str,
    alpha: f64,
) -> Result<(StreetGraph, &'static str), GraphError> {
    let patch = risk_cost_patch(graph, risk_attr, alpha);
    Ok((graph.with_patch(&patch)?, RISK_COST_ATTR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrValue, EdgeId};
    use crate::model::tests::square;

    fn with_risks(risks: &[AttrValue]) -> StreetGraph {
        let mut json = serde_json::to_value(square()).unwrap();
        for (edge, risk) in json["edges"].as_array_mut().unwrap().iter_mut().zip(risks) {
            edge["attributes"] = serde_json::json!({ "kde_score_for_12_16": risk });
        }
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn cost_is_bounded_by_length_and_alpha() {
        let risks: Vec<AttrValue> = [0.0, 1e-6, 5e-6, 2e-6, 0.0, 3e-6, 1e-7, 0.0, 4e-6]
            .into_iter()
            .map(AttrValue::Number)
            .collect();
        let graph = with_risks(&risks);
        for alpha in [0.0, 1.0, 3.0, 10.0] {
            let (costed, attr) = add_risk_cost_weights(&graph, "kde_score_for_12_16", alpha).unwrap();
            assert_eq!(attr, "risk_cost");
            for edge in costed.edges() {
                let cost = edge.attribute_f64(attr);
                assert!(cost >= edge.length - 1e-9);
                assert!(cost <= edge.length * (1.0 + alpha) + 1e-9);
            }
        }
    }

    #[test]
    fn riskiest_edge_gets_full_multiplier() {
        let risks: Vec<AttrValue> = [1.0, 2.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            .into_iter()
            .map(AttrValue::Number)
            .collect();
        let patch = risk_cost_patch(&with_risks(&risks), "kde_score_for_12_16", 3.0);
        assert!((patch.values[&EdgeId::new(2)] - 400.0).abs() < 1e-9);
        assert!((patch.values[&EdgeId::new(1)] - 250.0).abs() < 1e-9);
        assert!((patch.values[&EdgeId::new(3)] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn all_zero_risk_keeps_length() {
        let patch = risk_cost_patch(&square(), "kde_score_for_12_16", 3.0);
        for (id, edge) in square().edges_with_ids() {
            assert!((patch.values[&id] - edge.length).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn text_risks_are_coerced() {
        let risks = vec![
            AttrValue::Text("2.0".to_string()),
            AttrValue::Text(String::new()),
            AttrValue::Text("bogus".to_string()),
            AttrValue::Null,
            AttrValue::Number(-5.0),
            AttrValue::Number(1.0),
            AttrValue::Number(0.0),
            AttrValue::Number(0.0),
            AttrValue::Number(0.0),
        ];
        let patch = risk_cost_patch(&with_risks(&risks), "kde_score_for_12_16", 3.0);
        assert!((patch.values[&EdgeId::new(0)] - 400.0).abs() < 1e-9);
        assert!((patch.values[&EdgeId::new(1)] - 100.0).abs() < 1e-9);
        assert!((patch.values[&EdgeId::new(2)] - 100.0).abs() < 1e-9);
        assert!((patch.values[&EdgeId::new(4)] - 100.0).abs() < 1e-9);
        assert!((patch.values[&EdgeId::new(5)] - 250.0).abs() < 1e-9);
    }

    #[test]
    fn length_is_never_replaced() {
        let (costed, _) = add_risk_cost_weights(&square(), "missing", 3.0).unwrap();
        for (a, b) in square().edges().zip(costed.edges()) {
            assert!((a.length - b.length).abs() < f64::EPSILON);
        }
    }
}
