use crate::domain::entities::market::Candle;

pub trait Indicator {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;
}

pub struct EMA {
    pub period: usize,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        EMA { period }
    }

    pub fn calculate_on_values(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() || self.period == 0 || values.len() < self.period {
            return vec![];
        }
        let mut ema_values = Vec::with_capacity(values.len());
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        // First EMA is the SMA of the initial window
        let mut sum = 0.0;
        for value in values.iter().take(self.period) {
            sum += value;
        }
        let mut ema = sum / self.period as f64;
        ema_values.push(ema);

        for &value in values.iter().skip(self.period) {
            ema = (value - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

impl Indicator for EMA {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.calculate_on_values(&closes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .map(|&close| Candle {
                timestamp: Utc::now(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_ema_starts_with_sma_of_first_window() {
        let ema = EMA::new(3);
        let values = ema.calculate_on_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(values.len(), 2);
        assert!((values[0] - 2.0).abs() < 1e-12);
        // multiplier = 0.5, so next EMA = (4 - 2) * 0.5 + 2 = 3
        assert!((values[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_requires_full_window() {
        let ema = EMA::new(5);
        assert!(ema.calculate_on_values(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_ema_over_candles_uses_closes() {
        let ema = EMA::new(2);
        let candles = candles_from_closes(&[2.0, 4.0, 6.0]);
        let values = ema.calculate(&candles);
        assert_eq!(values.len(), 2);
        assert!((values[0] - 3.0).abs() < 1e-12);
    }
}
