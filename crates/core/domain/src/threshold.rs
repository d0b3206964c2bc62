//! 阈值规则与告警模型。

use serde::{Deserialize, Serialize};

/// 阈值比较运算符。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdOperator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl ThresholdOperator {
    /// 解析运算符文本，未知运算符返回 None。
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// 判断 `actual <op> threshold` 是否成立。
    pub fn matches(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => actual > threshold,
            Self::Lt => actual < threshold,
            Self::Ge => actual >= threshold,
            Self::Le => actual <= threshold,
            Self::Eq => actual == threshold,
            Self::Ne => actual != threshold,
        }
    }
}

/// 阈值规则。只有 enabled 且未屏蔽的规则会触发。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub id: i64,
    pub device_id: i64,
    pub field_name: String,
    pub operator: String,
    pub value: f64,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub shielded: bool,
    #[serde(default)]
    pub message: String,
}

impl Threshold {
    /// 规则是否参与评估。
    pub fn is_active(&self) -> bool {
        self.enabled && !self.shielded
    }
}

/// 告警负载：写入告警日志并广播到所有北向。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub device_id: i64,
    pub device_name: String,
    pub product_key: String,
    pub device_key: String,
    pub field_name: String,
    pub actual_value: f64,
    pub threshold: f64,
    pub operator: String,
    pub severity: String,
    pub message: String,
}

/// 告警日志行。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmLog {
    pub id: i64,
    pub device_id: i64,
    pub threshold_id: Option<i64>,
    pub field_name: String,
    pub actual_value: f64,
    pub threshold_value: f64,
    pub operator: String,
    pub severity: String,
    pub message: String,
    pub triggered_at_ms: i64,
    pub acknowledged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_parse_and_match() {
        let op = ThresholdOperator::parse(" >= ").expect("op");
        assert_eq!(op, ThresholdOperator::Ge);
        assert!(op.matches(50.0, 50.0));
        assert!(!ThresholdOperator::Ne.matches(1.0, 1.0));
        assert!(ThresholdOperator::parse("=>").is_none());
        assert_eq!(ThresholdOperator::Lt.as_str(), "<");
    }

    #[test]
    fn shielded_rule_is_inactive() {
        let rule = Threshold {
            enabled: true,
            shielded: true,
            ..Default::default()
        };
        assert!(!rule.is_active());
    }
}
