// src/model/currency.rs

use std::collections::HashMap;

use crate::error::CurrencyError;

/// 外部汇率服务的查询接口
pub trait CurrencyConverter: Send + Sync {
    fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, CurrencyError>;
}

/// 基于固定汇率表的换算，支持反向汇率
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: HashMap<String, HashMap<String, f64>>,
}

impl StaticRates {
    pub fn new(rates: HashMap<String, HashMap<String, f64>>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(from, to)| {
                let to = to
                    .into_iter()
                    .map(|(ccy, rate)| (ccy.to_uppercase(), rate))
                    .collect();
                (from.to_uppercase(), to)
            })
            .collect();
        Self { rates }
    }

    fn rate(&self, from: &str, to: &str) -> Option<f64> {
        if let Some(rate) = self.rates.get(from).and_then(|m| m.get(to)) {
            return Some(*rate);
        }
        self.rates
            .get(to)
            .and_then(|m| m.get(from))
            .filter(|r| **r > 0.0)
            .map(|r| 1.0 / r)
    }
}

impl CurrencyConverter for StaticRates {
    fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, CurrencyError> {
        let from_u = from.to_uppercase();
        let to_u = to.to_uppercase();
        if from_u == to_u {
            return Ok(amount);
        }
        self.rate(&from_u, &to_u)
            .map(|rate| amount * rate)
            .ok_or(CurrencyError::UnknownPair { from: from_u, to: to_u })
    }
}
