//! Brokerage REST client.
//!
//! Wraps an Alpaca-style trading API: order placement/query/cancel, open
//! positions, fill activities and the market clock. A 404 on order lookup is
//! surfaced as a distinct error so callers can branch between "definitely
//! gone" and "lookup failed".

use crate::types::Side;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// A broker order, possibly carrying dependent child legs (bracket orders).
///
/// The `legs` nesting is broker-controlled and treated as untrusted input;
/// consumers must walk it with an explicit depth bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(rename = "symbol")]
    pub ticker: String,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    pub status: String,
    pub side: String,
    #[serde(default)]
    pub qty: Option<Decimal>,
    #[serde(default)]
    pub filled_qty: Option<Decimal>,
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub legs: Option<Vec<BrokerOrder>>,
}

impl BrokerOrder {
    /// Terminal broker statuses: the order will never fill further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "filled" | "canceled" | "cancelled" | "expired" | "rejected" | "done_for_day"
        )
    }

    pub fn is_stop_type(&self) -> bool {
        matches!(
            self.order_type.as_deref(),
            Some("stop") | Some("stop_limit") | Some("trailing_stop")
        )
    }
}

/// An open broker position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    #[serde(rename = "symbol")]
    pub ticker: String,
    pub qty: Decimal,
    #[serde(default)]
    pub avg_entry_price: Option<Decimal>,
    /// "long" or "short".
    pub side: String,
}

impl BrokerPosition {
    pub fn direction(&self) -> Side {
        if self.side.eq_ignore_ascii_case("short") {
            Side::Short
        } else {
            Side::Long
        }
    }
}

/// A fill (execution) activity record keyed by order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillActivity {
    pub id: String,
    pub order_id: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub side: String,
    #[serde(default)]
    pub transaction_time: Option<DateTime<Utc>>,
}

/// Latest quote for a ticker. Any field can be missing off-hours.
#[derive(Debug, Clone, Default)]
pub struct Quote {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
}

impl Quote {
    /// Best decision price: bid/ask midpoint, then last trade.
    pub fn decision_price(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > Decimal::ZERO && ask > Decimal::ZERO => {
                Some((bid + ask) / Decimal::TWO)
            }
            _ => self.last,
        }
    }
}

/// Market clock snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketClock {
    pub is_open: bool,
    #[serde(default)]
    pub next_open: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_close: Option<DateTime<Utc>>,
}

/// Child legs of a bracket order submission.
#[derive(Debug, Clone, Serialize)]
pub struct BracketLegs {
    pub take_profit_limit: Decimal,
    pub stop_loss_stop: Decimal,
}

/// Bracket order submission: parent limit entry plus stop-loss and
/// take-profit children.
#[derive(Debug, Clone, Serialize)]
pub struct BracketOrderRequest {
    pub ticker: String,
    pub side: Side,
    pub quantity: i64,
    pub limit_price: Decimal,
    pub legs: BracketLegs,
    /// Client-supplied idempotency key.
    pub client_order_id: String,
}

/// Brokerage API surface used by the engines.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Open (non-terminal) orders, optionally filtered by ticker.
    async fn list_open_orders(&self, ticker: Option<String>) -> Result<Vec<BrokerOrder>>;
    /// Look up one order by broker id. 404 maps to [`Error::BrokerNotFound`].
    async fn get_order(&self, order_id: &str) -> Result<BrokerOrder>;
    async fn place_bracket_order(&self, request: &BracketOrderRequest) -> Result<BrokerOrder>;
    async fn cancel_order(&self, order_id: &str) -> Result<()>;
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>>;
    /// Fill activities restricted to the given order ids.
    async fn list_fill_activities(&self, order_ids: &[String]) -> Result<Vec<FillActivity>>;
    async fn clock(&self) -> Result<MarketClock>;
    async fn latest_quote(&self, ticker: &str) -> Result<Quote>;
}

/// REST implementation against an Alpaca-compatible trading API.
pub struct RestBroker {
    base_url: String,
    data_url: String,
    key_id: String,
    secret_key: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct WireBracketRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
    limit_price: String,
    order_class: &'static str,
    take_profit: WireTakeProfit,
    stop_loss: WireStopLoss,
    client_order_id: &'a str,
}

#[derive(Serialize)]
struct WireTakeProfit {
    limit_price: String,
}

#[derive(Serialize)]
struct WireStopLoss {
    stop_price: String,
}

#[derive(Deserialize)]
struct WireLatestQuote {
    quote: WireQuoteBody,
}

#[derive(Deserialize)]
struct WireQuoteBody {
    #[serde(rename = "bp", default)]
    bid_price: Option<Decimal>,
    #[serde(rename = "ap", default)]
    ask_price: Option<Decimal>,
}

#[derive(Deserialize)]
struct WireLatestTrade {
    trade: WireTradeBody,
}

#[derive(Deserialize)]
struct WireTradeBody {
    #[serde(rename = "p")]
    price: Decimal,
}

impl RestBroker {
    /// Maximum retry attempts for API calls.
    const MAX_RETRIES: u32 = 3;

    pub fn new(config: &crate::config::BrokerConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .connect_timeout(StdDuration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            secret_key: config.secret_key.clone(),
            http_client,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    /// Execute a request with retry and exponential backoff.
    ///
    /// Retries on 5xx server errors and 429 rate-limit responses (longer
    /// backoff for 429). Other 4xx errors fail immediately; 404 becomes
    /// [`Error::BrokerNotFound`] carrying `not_found_id`.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
        not_found_id: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..Self::MAX_RETRIES {
            match self.authed(build()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status().as_u16() == 404 => {
                    return Err(Error::BrokerNotFound {
                        order_id: not_found_id.unwrap_or("unknown").to_string(),
                    });
                }
                Ok(response)
                    if response.status().as_u16() == 429 || response.status().is_server_error() =>
                {
                    let status = response.status();
                    let is_rate_limited = status.as_u16() == 429;
                    warn!(
                        attempt = attempt + 1,
                        status = %status,
                        rate_limited = is_rate_limited,
                        "Retryable broker API error, backing off"
                    );
                    last_error = Some(Error::Broker {
                        message: format!(
                            "{}: {}",
                            if is_rate_limited {
                                "Rate limited"
                            } else {
                                "Server error"
                            },
                            status
                        ),
                        status: Some(status.as_u16()),
                    });

                    if attempt + 1 < Self::MAX_RETRIES {
                        let backoff = if is_rate_limited {
                            StdDuration::from_millis(2000 * 2u64.pow(attempt))
                        } else {
                            StdDuration::from_millis(500 * 2u64.pow(attempt))
                        };
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Broker {
                        message: format!("broker API error {}: {}", status, body),
                        status: Some(status.as_u16()),
                    });
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Broker HTTP request failed, backing off");
                    last_error = Some(Error::Http(e));
                }
            }

            if attempt + 1 < Self::MAX_RETRIES {
                let backoff = StdDuration::from_millis(500 * 2u64.pow(attempt));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or(Error::Broker {
            message: "Max retries exceeded".to_string(),
            status: None,
        }))
    }
}

#[async_trait]
impl Brokerage for RestBroker {
    async fn list_open_orders(&self, ticker: Option<String>) -> Result<Vec<BrokerOrder>> {
        let mut url = format!("{}/v2/orders?status=open&nested=true&limit=500", self.base_url);
        if let Some(sym) = &ticker {
            url.push_str(&format!("&symbols={}", sym));
        }
        let response = self
            .send_with_retry(|| self.http_client.get(&url), None)
            .await?;
        let orders: Vec<BrokerOrder> = response.json().await?;
        debug!(count = orders.len(), ticker = ?ticker, "Fetched open orders");
        Ok(orders)
    }

    async fn get_order(&self, order_id: &str) -> Result<BrokerOrder> {
        let url = format!("{}/v2/orders/{}?nested=true", self.base_url, order_id);
        let response = self
            .send_with_retry(|| self.http_client.get(&url), Some(order_id))
            .await?;
        Ok(response.json().await?)
    }

    async fn place_bracket_order(&self, request: &BracketOrderRequest) -> Result<BrokerOrder> {
        let wire = WireBracketRequest {
            symbol: &request.ticker,
            qty: request.quantity.to_string(),
            side: match request.side {
                Side::Long => "buy",
                Side::Short => "sell",
            },
            order_type: "limit",
            time_in_force: "day",
            limit_price: request.limit_price.to_string(),
            order_class: "bracket",
            take_profit: WireTakeProfit {
                limit_price: request.legs.take_profit_limit.to_string(),
            },
            stop_loss: WireStopLoss {
                stop_price: request.legs.stop_loss_stop.to_string(),
            },
            client_order_id: &request.client_order_id,
        };

        let url = format!("{}/v2/orders", self.base_url);
        let response = self
            .send_with_retry(|| self.http_client.post(&url).json(&wire), None)
            .await?;
        let order: BrokerOrder = response.json().await?;
        info!(
            ticker = %request.ticker,
            order_id = %order.id,
            qty = request.quantity,
            limit = %request.limit_price,
            "Submitted bracket order"
        );
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let url = format!("{}/v2/orders/{}", self.base_url, order_id);
        self.send_with_retry(|| self.http_client.delete(&url), Some(order_id))
            .await?;
        info!(order_id = %order_id, "Cancelled broker order");
        Ok(())
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>> {
        let url = format!("{}/v2/positions", self.base_url);
        let response = self
            .send_with_retry(|| self.http_client.get(&url), None)
            .await?;
        let positions: Vec<BrokerPosition> = response.json().await?;
        debug!(count = positions.len(), "Fetched broker positions");
        Ok(positions)
    }

    async fn list_fill_activities(&self, order_ids: &[String]) -> Result<Vec<FillActivity>> {
        // The activities endpoint has no order-id filter; fetch recent fills
        // and filter client-side.
        let url = format!(
            "{}/v2/account/activities/FILL?page_size=100&direction=desc",
            self.base_url
        );
        let response = self
            .send_with_retry(|| self.http_client.get(&url), None)
            .await?;
        let all: Vec<FillActivity> = response.json().await?;
        let matched: Vec<FillActivity> = all
            .into_iter()
            .filter(|a| order_ids.iter().any(|id| id == &a.order_id))
            .collect();
        debug!(matched = matched.len(), wanted = order_ids.len(), "Fetched fill activities");
        Ok(matched)
    }

    async fn clock(&self) -> Result<MarketClock> {
        let url = format!("{}/v2/clock", self.base_url);
        let response = self
            .send_with_retry(|| self.http_client.get(&url), None)
            .await?;
        Ok(response.json().await?)
    }

    async fn latest_quote(&self, ticker: &str) -> Result<Quote> {
        let quote_url = format!("{}/v2/stocks/{}/quotes/latest", self.data_url, ticker);
        let mut quote = Quote::default();

        match self
            .send_with_retry(|| self.http_client.get(&quote_url), None)
            .await
        {
            Ok(response) => {
                if let Ok(wire) = response.json::<WireLatestQuote>().await {
                    quote.bid = wire.quote.bid_price.filter(|p| *p > Decimal::ZERO);
                    quote.ask = wire.quote.ask_price.filter(|p| *p > Decimal::ZERO);
                }
            }
            Err(e) => warn!(ticker = %ticker, error = %e, "Latest quote fetch failed"),
        }

        // Last trade is a fallback source; its failure is not fatal either.
        let trade_url = format!("{}/v2/stocks/{}/trades/latest", self.data_url, ticker);
        match self
            .send_with_retry(|| self.http_client.get(&trade_url), None)
            .await
        {
            Ok(response) => {
                if let Ok(wire) = response.json::<WireLatestTrade>().await {
                    quote.last = Some(wire.trade.price);
                }
            }
            Err(e) => warn!(ticker = %ticker, error = %e, "Latest trade fetch failed"),
        }

        Ok(quote)
    }
}
