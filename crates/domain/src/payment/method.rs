use serde::{Deserialize, Serialize};

use crate::DomainError;
use crate::wire::CodeOrName;

/// Payment channel chosen by the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CodeOrName", into = "&'static str")]
pub enum PaymentMethod {
    Alipay,
    WechatPay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Alipay => "alipay",
            PaymentMethod::WechatPay => "wechat_pay",
        }
    }

    fn code(&self) -> i64 {
        match self {
            PaymentMethod::Alipay => 0,
            PaymentMethod::WechatPay => 1,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [PaymentMethod::Alipay, PaymentMethod::WechatPay]
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "payment method",
                value: s.to_string(),
            })
    }
}

impl TryFrom<CodeOrName> for PaymentMethod {
    type Error = DomainError;

    fn try_from(value: CodeOrName) -> Result<Self, Self::Error> {
        match value {
            CodeOrName::Name(name) => name.parse(),
            CodeOrName::Code(code) => [PaymentMethod::Alipay, PaymentMethod::WechatPay]
                .into_iter()
                .find(|m| m.code() == code)
                .ok_or_else(|| DomainError::UnknownValue {
                    kind: "payment method",
                    value: code.to_string(),
                }),
        }
    }
}

impl From<PaymentMethod> for &'static str {
    fn from(method: PaymentMethod) -> Self {
        method.as_str()
    }
}
