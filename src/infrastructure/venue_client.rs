//! Bittrex Client
//!
//! REST client for the Bittrex v1.1 spot API, the live venue behind the
//! `ExchangeClient` port. Public market data is read from the v1.1 public
//! endpoints and the v2 candle endpoint; account and order operations are
//! signed with the HMAC-SHA512 `apisign` scheme. Every request carries the
//! configured timeout so a stalled venue surfaces as `ExchangeError::Timeout`
//! instead of wedging a cycle.

use crate::domain::entities::market::{Candle, CandlePeriod, CurrencyPair, MarketSummary, Ticker};
use crate::domain::repositories::exchange_client::{
    Balance, ExchangeClient, ExchangeError, ExchangeResult, OrderInfo, OrderStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha512;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const BITTREX_API_BASE: &str = "https://api.bittrex.com/api/v1.1";
const BITTREX_TICKS_BASE: &str = "https://api.bittrex.com/Api/v2.0";

/// Bittrex connection configuration.
#[derive(Debug, Clone)]
pub struct BittrexConfig {
    pub api_base: String,
    pub ticks_base: String,
    pub api_key: String,
    pub api_secret: String,
    pub request_timeout: Duration,
}

impl BittrexConfig {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_base: BITTREX_API_BASE.to_string(),
            ticks_base: BITTREX_TICKS_BASE.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Envelope every Bittrex response arrives in.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    message: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MarketSummaryDto {
    market_name: String,
    base_volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TickerDto {
    bid: f64,
    ask: f64,
    last: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BalanceDto {
    currency: String,
    balance: Option<f64>,
    available: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderIdDto {
    uuid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderDto {
    quantity: f64,
    quantity_remaining: f64,
    limit: f64,
    price_per_unit: Option<f64>,
    opened: Option<String>,
    closed: Option<String>,
    is_open: bool,
    cancel_initiated: bool,
}

#[derive(Debug, Deserialize)]
struct TickDto {
    #[serde(rename = "O")]
    open: f64,
    #[serde(rename = "H")]
    high: f64,
    #[serde(rename = "L")]
    low: f64,
    #[serde(rename = "C")]
    close: f64,
    #[serde(rename = "V")]
    volume: f64,
    #[serde(rename = "T")]
    time: String,
}

/// Parse the venue's timezone-less timestamps as UTC.
fn parse_venue_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Map a v1.1 order record onto the port's status enum.
fn order_status(order: &OrderDto) -> OrderStatus {
    if order.is_open {
        if order.quantity_remaining < order.quantity {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        }
    } else if order.cancel_initiated || order.quantity_remaining > 0.0 {
        OrderStatus::Cancelled
    } else {
        OrderStatus::Filled
    }
}

/// Split a "QUOTE-BASE" market name into a currency pair.
fn parse_market_name(market_name: &str) -> Option<CurrencyPair> {
    let (quote, base) = market_name.split_once('-')?;
    if quote.is_empty() || base.is_empty() {
        return None;
    }
    Some(CurrencyPair::new(base, quote))
}

fn tick_interval(period: CandlePeriod) -> &'static str {
    match period {
        CandlePeriod::OneMinute => "oneMin",
        CandlePeriod::FiveMinutes => "fiveMin",
        CandlePeriod::ThirtyMinutes => "thirtyMin",
        CandlePeriod::Hour => "hour",
        CandlePeriod::Day => "day",
    }
}

fn map_request_error(error: reqwest::Error) -> ExchangeError {
    if error.is_timeout() {
        ExchangeError::Timeout
    } else {
        ExchangeError::NetworkError(error.to_string())
    }
}

/// Bittrex client for API interactions.
pub struct BittrexClient {
    client: Client,
    config: BittrexConfig,
}

impl BittrexClient {
    pub fn new(config: BittrexConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn nonce() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
            .to_string()
    }

    /// HMAC-SHA512 signature over the full request URI.
    fn sign(&self, uri: &str) -> Result<String, ExchangeError> {
        let mut mac = Hmac::<Sha512>::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|_| ExchangeError::AuthenticationError("Invalid API secret".to_string()))?;
        mac.update(uri.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn unwrap_response<T>(response: ApiResponse<T>) -> ExchangeResult<T> {
        if !response.success {
            return Err(ExchangeError::MarketDataFailed(
                response
                    .message
                    .unwrap_or_else(|| "Venue reported failure".to_string()),
            ));
        }
        response
            .result
            .ok_or_else(|| ExchangeError::MarketDataFailed("Empty result".to_string()))
    }

    async fn get_public<T: DeserializeOwned>(&self, url: String) -> ExchangeResult<T> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_request_error)?;
        let api: ApiResponse<T> = response.json().await.map_err(map_request_error)?;
        Self::unwrap_response(api)
    }

    async fn fetch_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<ApiResponse<T>> {
        let mut url = format!(
            "{}{}?apikey={}&nonce={}",
            self.config.api_base,
            path,
            self.config.api_key,
            Self::nonce()
        );
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, value));
        }
        let signature = self.sign(&url)?;

        debug!("GET {}", path);
        let response = self
            .client
            .get(&url)
            .header("apisign", signature)
            .send()
            .await
            .map_err(map_request_error)?;
        response.json().await.map_err(map_request_error)
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let api = self.fetch_signed(path, params).await?;
        Self::unwrap_response(api)
    }
}

#[async_trait]
impl ExchangeClient for BittrexClient {
    fn name(&self) -> &str {
        "bittrex"
    }

    async fn get_market_summaries(&self) -> ExchangeResult<Vec<MarketSummary>> {
        let url = format!("{}/public/getmarketsummaries", self.config.api_base);
        let summaries: Vec<MarketSummaryDto> = self.get_public(url).await?;

        Ok(summaries
            .into_iter()
            .filter_map(|dto| {
                let currency_pair = parse_market_name(&dto.market_name)?;
                Some(MarketSummary {
                    market_name: dto.market_name,
                    base_volume: dto.base_volume.unwrap_or(0.0),
                    currency_pair,
                })
            })
            .collect())
    }

    async fn get_ticker(&self, market: &str) -> ExchangeResult<Ticker> {
        let url = format!(
            "{}/public/getticker?market={}",
            self.config.api_base, market
        );
        let dto: TickerDto = self.get_public(url).await?;
        Ok(Ticker {
            bid: dto.bid,
            ask: dto.ask,
            last: dto.last,
        })
    }

    async fn get_ticker_history(
        &self,
        market: &str,
        since: DateTime<Utc>,
        period: CandlePeriod,
    ) -> ExchangeResult<Vec<Candle>> {
        let url = format!(
            "{}/pub/market/GetTicks?marketName={}&tickInterval={}",
            self.config.ticks_base,
            market,
            tick_interval(period)
        );
        let ticks: Vec<TickDto> = self.get_public(url).await?;

        Ok(ticks
            .into_iter()
            .filter_map(|tick| {
                let timestamp = parse_venue_time(&tick.time)?;
                if timestamp < since {
                    return None;
                }
                Some(Candle {
                    timestamp,
                    open: tick.open,
                    high: tick.high,
                    low: tick.low,
                    close: tick.close,
                    volume: tick.volume,
                })
            })
            .collect())
    }

    async fn get_balance(&self, currency: &str) -> ExchangeResult<Balance> {
        let dto: BalanceDto = self
            .get_signed(
                "/account/getbalance",
                &[("currency", currency.to_string())],
            )
            .await
            .map_err(|e| ExchangeError::BalanceQueryFailed(e.to_string()))?;

        Ok(Balance {
            currency: dto.currency,
            available: dto.available.unwrap_or(0.0),
            total: dto.balance.unwrap_or(0.0),
        })
    }

    async fn buy(&self, market: &str, quantity: f64, rate: f64) -> ExchangeResult<String> {
        let dto: OrderIdDto = self
            .get_signed(
                "/market/buylimit",
                &[
                    ("market", market.to_string()),
                    ("quantity", format!("{:.8}", quantity)),
                    ("rate", format!("{:.8}", rate)),
                ],
            )
            .await
            .map_err(|e| ExchangeError::OrderPlacementFailed(e.to_string()))?;
        Ok(dto.uuid)
    }

    async fn sell(&self, market: &str, quantity: f64, rate: f64) -> ExchangeResult<String> {
        let dto: OrderIdDto = self
            .get_signed(
                "/market/selllimit",
                &[
                    ("market", market.to_string()),
                    ("quantity", format!("{:.8}", quantity)),
                    ("rate", format!("{:.8}", rate)),
                ],
            )
            .await
            .map_err(|e| ExchangeError::OrderPlacementFailed(e.to_string()))?;
        Ok(dto.uuid)
    }

    async fn get_order(&self, order_id: &str, market: &str) -> ExchangeResult<OrderInfo> {
        let dto: OrderDto = self
            .get_signed("/account/getorder", &[("uuid", order_id.to_string())])
            .await
            .map_err(|e| ExchangeError::OrderStatusFailed(e.to_string()))?;

        let time = dto
            .closed
            .as_deref()
            .and_then(parse_venue_time)
            .or_else(|| dto.opened.as_deref().and_then(parse_venue_time))
            .unwrap_or_else(Utc::now);

        Ok(OrderInfo {
            order_id: order_id.to_string(),
            market: market.to_string(),
            status: order_status(&dto),
            original_quantity: dto.quantity,
            price: dto.price_per_unit.unwrap_or(dto.limit),
            time,
        })
    }

    async fn cancel_order(&self, order_id: &str, _market: &str) -> ExchangeResult<()> {
        // A successful cancel comes back with a null result, so only the
        // success flag matters here.
        let api: ApiResponse<serde_json::Value> = self
            .fetch_signed("/market/cancel", &[("uuid", order_id.to_string())])
            .await
            .map_err(|e| ExchangeError::OrderCancellationFailed(e.to_string()))?;
        if !api.success {
            return Err(ExchangeError::OrderCancellationFailed(
                api.message.unwrap_or_else(|| "Venue reported failure".to_string()),
            ));
        }
        Ok(())
    }
}
