//! 评分结果
//!
//! 每个评分维度（completeness / accuracy / spag）对应一个 `{score, reasoning}`。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::AssessmentError;

/// 必须出现的评分维度
pub const REQUIRED_CRITERIA: [&str; 3] = ["completeness", "accuracy", "spag"];

/// 单个维度的评分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: f64,
    pub reasoning: String,
}

impl Assessment {
    pub fn new(score: f64, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
        }
    }
}

/// 维度名 → 评分
pub type Assessments = BTreeMap<String, Assessment>;

/// 将对象的键统一转为小写
///
/// LLM 返回的键大小写并不稳定（例如 `Completeness`）。非对象原样返回。
pub fn normalise_keys_to_lowercase(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let normalised: Map<String, JsonValue> = map
                .into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect();
            JsonValue::Object(normalised)
        }
        other => other,
    }
}

/// 校验评分数据结构
///
/// 必须包含全部 [`REQUIRED_CRITERIA`]，且每个维度（包括额外出现的维度）都是
/// `{score: number, reasoning: string}`。
pub fn validate_assessment_data(data: &JsonValue) -> bool {
    check_assessment_data(data).is_ok()
}

fn check_assessment_data(data: &JsonValue) -> Result<(), AssessmentError> {
    let object = data.as_object().ok_or_else(|| {
        AssessmentError::InvalidAssessmentData("评分数据不是 JSON 对象".to_string())
    })?;

    if let Some(missing) = REQUIRED_CRITERIA
        .iter()
        .find(|criterion| !object.contains_key(**criterion))
    {
        return Err(AssessmentError::InvalidAssessmentData(format!(
            "缺少评分维度 {}",
            missing
        )));
    }

    for (criterion, details) in object {
        let well_formed = details.get("score").map_or(false, JsonValue::is_number)
            && details.get("reasoning").map_or(false, JsonValue::is_string);
        if !well_formed {
            return Err(AssessmentError::InvalidAssessmentData(format!(
                "评分维度 {} 结构不完整",
                criterion
            )));
        }
    }
    Ok(())
}

/// 从已归一化的评分数据构建评分集合
pub fn assessments_from_data(data: &JsonValue) -> Result<Assessments, AssessmentError> {
    check_assessment_data(data)?;
    serde_json::from_value(data.clone())
        .map_err(|e| AssessmentError::InvalidAssessmentData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete() -> JsonValue {
        json!({
            "completeness": {"score": 5, "reasoning": "complete"},
            "accuracy": {"score": 5, "reasoning": "correct"},
            "spag": {"score": 4, "reasoning": "minor typo"}
        })
    }

    #[test]
    fn test_validate_accepts_complete_payload() {
        assert!(validate_assessment_data(&complete()));
    }

    #[test]
    fn test_validate_rejects_missing_spag() {
        let partial = json!({
            "completeness": {"score": 4, "reasoning": "x"},
            "accuracy": {"score": 3, "reasoning": "y"}
        });
        assert!(!validate_assessment_data(&partial));
    }

    #[test]
    fn test_validate_rejects_wrong_types() {
        let mut data = complete();
        data["accuracy"]["score"] = json!("5");
        assert!(!validate_assessment_data(&data));

        let mut data = complete();
        data["spag"]["reasoning"] = json!(3);
        assert!(!validate_assessment_data(&data));
    }

    #[test]
    fn test_validate_rejects_incomplete_extra_criterion() {
        let mut data = complete();
        data["creativity"] = json!({"score": 2});
        assert!(!validate_assessment_data(&data));
    }

    #[test]
    fn test_normalise_then_build() {
        let data = normalise_keys_to_lowercase(json!({
            "Completeness": {"score": 1, "reasoning": "a"},
            "ACCURACY": {"score": 2, "reasoning": "b"},
            "Spag": {"score": 3.5, "reasoning": "c"}
        }));
        let assessments = assessments_from_data(&data).unwrap();
        assert_eq!(assessments.len(), 3);
        assert_eq!(assessments["spag"], Assessment::new(3.5, "c"));
    }
}
