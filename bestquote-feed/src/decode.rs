//! Binance-style JSON frame decoding.
//!
//! Numeric fields arrive as decimal text. Anything that does not parse to a
//! finite, non-negative `f64` fails the whole frame here, before the store
//! sees it.

use crate::error::DecodeError;
use crate::event::{DepthEvent, FeedEvent, FeedKind, TickerEvent};
use bestquote_book::{Instrument, QuoteSide, Side, Timestamp};
use serde::Deserialize;
use serde::de::DeserializeOwned;

const DEPTH_EVENT_TYPE: &str = "depthUpdate";
const BOOK_TICKER_EVENT_TYPE: &str = "bookTicker";

/// Combined-stream envelope or a bare payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Combined { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Combined { data } | Self::Bare(data) => data,
        }
    }
}

/// Depth diff message.
#[derive(Debug, Deserialize)]
struct WireDepthUpdate {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

/// Book ticker stream message.
#[derive(Debug, Deserialize)]
struct WireBookTicker {
    #[serde(rename = "e", default)]
    event_type: Option<String>,
    #[serde(rename = "u", default)]
    update_id: Option<u64>,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid_price: String,
    #[serde(rename = "B")]
    bid_qty: String,
    #[serde(rename = "a")]
    ask_price: String,
    #[serde(rename = "A")]
    ask_qty: String,
}

/// REST book ticker response entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRestTicker {
    symbol: String,
    bid_price: String,
    bid_qty: String,
    ask_price: String,
    ask_qty: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRestBody {
    One(WireRestTicker),
    Many(Vec<WireRestTicker>),
}

fn parse_decimal(field: &'static str, text: &str) -> Result<f64, DecodeError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| DecodeError::invalid_number(field, text))
}

fn parse_quote(
    price_field: &'static str,
    price: &str,
    qty_field: &'static str,
    qty: &str,
) -> Result<QuoteSide, DecodeError> {
    let price = parse_decimal(price_field, price)?;
    let quantity = parse_decimal(qty_field, qty)?;
    Ok(QuoteSide::try_new(price, quantity)?)
}

fn check_symbol(instrument: &Instrument, symbol: &str) -> Result<(), DecodeError> {
    if instrument.matches(symbol) {
        Ok(())
    } else {
        Err(DecodeError::SymbolMismatch {
            expected: instrument.symbol.clone(),
            actual: symbol.to_string(),
        })
    }
}

fn parse_frame<T: DeserializeOwned>(frame: &str) -> Result<T, DecodeError> {
    let envelope: Envelope<T> = serde_json::from_str(frame)?;
    Ok(envelope.into_inner())
}

/// Decodes a depth diff frame.
///
/// # Errors
/// Returns `DecodeError` if the frame is malformed, for another symbol, or
/// carries an invalid level.
pub fn decode_depth(frame: &str, instrument: &Instrument) -> Result<DepthEvent, DecodeError> {
    let wire: WireDepthUpdate = parse_frame(frame)?;
    if wire.event_type != DEPTH_EVENT_TYPE {
        return Err(DecodeError::UnexpectedEvent(wire.event_type));
    }
    check_symbol(instrument, &wire.symbol)?;

    let mut levels = Vec::with_capacity(wire.bids.len() + wire.asks.len());
    for [price, qty] in &wire.bids {
        levels.push((Side::Bid, parse_quote("bid price", price, "bid quantity", qty)?));
    }
    for [price, qty] in &wire.asks {
        levels.push((Side::Ask, parse_quote("ask price", price, "ask quantity", qty)?));
    }

    Ok(DepthEvent {
        event_time: Timestamp::from_millis(wire.event_time),
        first_update_id: wire.first_update_id,
        final_update_id: wire.final_update_id,
        levels,
    })
}

/// Decodes a book ticker stream frame.
///
/// # Errors
/// Returns `DecodeError` if the frame is malformed, for another symbol, or
/// carries invalid prices.
pub fn decode_book_ticker(
    frame: &str,
    instrument: &Instrument,
) -> Result<TickerEvent, DecodeError> {
    let wire: WireBookTicker = parse_frame(frame)?;
    if let Some(event_type) = wire.event_type
        && event_type != BOOK_TICKER_EVENT_TYPE
    {
        return Err(DecodeError::UnexpectedEvent(event_type));
    }
    check_symbol(instrument, &wire.symbol)?;

    Ok(TickerEvent {
        update_id: wire.update_id,
        bid: parse_quote(
            "best bid price",
            &wire.bid_price,
            "best bid quantity",
            &wire.bid_qty,
        )?,
        ask: parse_quote(
            "best ask price",
            &wire.ask_price,
            "best ask quantity",
            &wire.ask_qty,
        )?,
    })
}

/// Decodes a REST book ticker response (single object or array).
///
/// # Errors
/// Returns `DecodeError` if the body is malformed, has no entry for the
/// instrument, or carries invalid prices.
pub fn decode_rest_ticker(body: &str, instrument: &Instrument) -> Result<TickerEvent, DecodeError> {
    let wire = match serde_json::from_str::<WireRestBody>(body)? {
        WireRestBody::One(ticker) => {
            check_symbol(instrument, &ticker.symbol)?;
            ticker
        }
        WireRestBody::Many(tickers) => {
            let count = tickers.len();
            tickers
                .into_iter()
                .find(|t| instrument.matches(&t.symbol))
                .ok_or_else(|| DecodeError::SymbolMismatch {
                    expected: instrument.symbol.clone(),
                    actual: format!("{count} other symbols"),
                })?
        }
    };

    Ok(TickerEvent {
        update_id: None,
        bid: parse_quote("bidPrice", &wire.bid_price, "bidQty", &wire.bid_qty)?,
        ask: parse_quote("askPrice", &wire.ask_price, "askQty", &wire.ask_qty)?,
    })
}

/// Decodes a stream frame of the given kind into a feed event.
///
/// # Errors
/// Returns the underlying `DecodeError`.
pub fn decode_frame(
    kind: FeedKind,
    frame: &str,
    instrument: &Instrument,
) -> Result<FeedEvent, DecodeError> {
    match kind {
        FeedKind::Depth => decode_depth(frame, instrument).map(FeedEvent::Depth),
        FeedKind::BookTicker => decode_book_ticker(frame, instrument).map(FeedEvent::Ticker),
    }
}
