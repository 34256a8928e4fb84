//! Strike normalizer: merges call/put legs into one row per strike.
//!
//! Captured payloads come in three interchangeable shapes. They are resolved
//! once into a [`ChainPayload`] and flattened into canonical legs; the merge
//! itself never looks at the original shape.

use super::coerce::{fmt_text, to_float, to_int, Volatility};
use super::{api_columns, leg_cells, sort_rows, OptionChain, OptionLeg, Side, Strike, StrikeRow};
use crate::error::ScrapeError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// The recognized upstream payload shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainPayload {
    /// `{"150": [{..call..}, {..put..}], ...}`: already grouped by strike;
    /// each leg names its side in `optionType`.
    StrikeKeyed(Vec<(String, Vec<Value>)>),
    /// `{"Call": [..], "Put": [..]}`: side given by the list, strike by
    /// each leg's `strikePrice`.
    SideLists { calls: Vec<Value>, puts: Vec<Value> },
    /// `[{..}, {..}]`: each leg carries `strikePrice` and `optionType`.
    Flat(Vec<Value>),
}

impl ChainPayload {
    /// Parse a decoded response body.
    pub fn from_body(body: &str) -> Result<Self, ScrapeError> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(value)
    }

    /// Resolve a JSON value into one of the known shapes. A top-level
    /// `{"data": ...}` envelope is unwrapped first.
    pub fn from_value(value: Value) -> Result<Self, ScrapeError> {
        let inner = match value {
            Value::Object(mut obj) if obj.contains_key("data") => {
                obj.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };

        match inner {
            Value::Array(items) => Ok(ChainPayload::Flat(items)),
            Value::Object(mut obj) if obj.contains_key("Call") || obj.contains_key("Put") => {
                Ok(ChainPayload::SideLists {
                    calls: take_list(&mut obj, "Call")?,
                    puts: take_list(&mut obj, "Put")?,
                })
            }
            Value::Object(obj) => Ok(ChainPayload::StrikeKeyed(
                obj.into_iter()
                    .map(|(strike, legs)| match legs {
                        Value::Array(items) => (strike, items),
                        single => (strike, vec![single]),
                    })
                    .collect(),
            )),
            other => Err(ScrapeError::PayloadParseFailure(format!(
                "expected an object or array, found {}",
                json_type(&other)
            ))),
        }
    }

    /// Flatten into (strike, side, fields) triples in encounter order.
    fn into_legs(self) -> Vec<RawLeg> {
        let mut legs = Vec::new();
        match self {
            ChainPayload::StrikeKeyed(groups) => {
                for (strike, items) in groups {
                    for item in items {
                        let side = side_of(&item);
                        legs.push(RawLeg::new(Strike::parse(&strike), side, item));
                    }
                }
            }
            ChainPayload::SideLists { calls, puts } => {
                for (side, items) in [(Side::Call, calls), (Side::Put, puts)] {
                    for item in items {
                        legs.push(RawLeg::new(strike_of(&item), Some(side), item));
                    }
                }
            }
            ChainPayload::Flat(items) => {
                for item in items {
                    let side = side_of(&item);
                    legs.push(RawLeg::new(strike_of(&item), side, item));
                }
            }
        }
        legs
    }
}

fn take_list(obj: &mut Map<String, Value>, key: &str) -> Result<Vec<Value>, ScrapeError> {
    match obj.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(ScrapeError::PayloadParseFailure(format!(
            "'{key}' should be a list, found {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn side_of(item: &Value) -> Option<Side> {
    item.get("optionType")
        .and_then(Value::as_str)
        .and_then(Side::parse)
}

fn strike_of(item: &Value) -> Strike {
    Strike::parse(&fmt_text(item.get("strikePrice")))
}

/// A leg flattened out of any payload shape.
struct RawLeg {
    strike: Strike,
    side: Option<Side>,
    fields: Value,
}

impl RawLeg {
    fn new(strike: Strike, side: Option<Side>, fields: Value) -> Self {
        Self { strike, side, fields }
    }

    /// Build the canonical leg. Fields missing at the top level fall back to
    /// the nested `raw` object.
    fn into_option_leg(self, side: Side) -> OptionLeg {
        let top = &self.fields;
        let raw = top.get("raw").filter(|r| r.is_object());
        let field = |name: &str| (top.get(name), raw.and_then(|r| r.get(name)));

        let float = |name: &str| {
            let (a, b) = field(name);
            to_float(a).or_else(|| to_float(b))
        };
        let int = |name: &str| {
            let (a, b) = field(name);
            to_int(a).or_else(|| to_int(b))
        };
        let text = |name: &str| {
            let (a, b) = field(name);
            let primary = fmt_text(a);
            if primary.is_empty() {
                fmt_text(b)
            } else {
                primary
            }
        };
        let (iv_top, iv_raw) = field("volatility");

        OptionLeg {
            strike: self.strike,
            side,
            last_price: float("lastPrice"),
            bid: float("bidPrice"),
            ask: float("askPrice"),
            price_change: text("priceChange"),
            volume: int("volume"),
            open_interest: int("openInterest"),
            implied_volatility: Volatility::from_value(iv_top)
                .or_else(|| Volatility::from_value(iv_raw)),
            trade_time: text("tradeTime"),
        }
    }
}

/// Index key for a strike bucket: numeric strikes merge across label
/// spellings (`"150"`, `"150.00"`), unparseable ones stay distinct by label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum StrikeKey {
    Value(u64),
    Label(String),
}

impl StrikeKey {
    fn of(strike: &Strike) -> Self {
        match strike.value {
            // +0.0 and -0.0 share a bucket
            Some(v) => StrikeKey::Value((v + 0.0).to_bits()),
            None => StrikeKey::Label(strike.label.clone()),
        }
    }
}

struct Bucket {
    strike: Strike,
    call: Option<OptionLeg>,
    put: Option<OptionLeg>,
}

/// Merge a payload into a side-by-side chain ordered by numeric strike.
///
/// Duplicate legs for the same side and strike: the first encountered wins.
/// This mirrors current upstream ordering and is not a guaranteed contract.
pub fn normalize(payload: ChainPayload) -> OptionChain {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<StrikeKey, usize> = HashMap::new();

    for leg in payload.into_legs() {
        let key = StrikeKey::of(&leg.strike);
        let slot = *index.entry(key).or_insert_with(|| {
            buckets.push(Bucket {
                strike: leg.strike.clone(),
                call: None,
                put: None,
            });
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];

        let Some(side) = leg.side else {
            debug!(strike = %leg.strike.label, "leg without a recognizable optionType");
            continue;
        };
        let target = match side {
            Side::Call => &mut bucket.call,
            Side::Put => &mut bucket.put,
        };
        if target.is_none() {
            *target = Some(leg.into_option_leg(side));
        } else {
            debug!(strike = %bucket.strike.label, side = side.label(), "duplicate leg ignored");
        }
    }

    let mut rows: Vec<StrikeRow> = buckets
        .into_iter()
        .map(|b| StrikeRow {
            strike: b.strike.display(),
            strike_value: b.strike.sort_value(),
            call: leg_cells(b.call.as_ref()),
            put: leg_cells(b.put.as_ref()),
        })
        .collect();
    sort_rows(&mut rows);

    OptionChain {
        columns: api_columns(),
        rows,
    }
}

/// Parse and normalize a decoded response body in one step.
pub fn normalize_body(body: &str) -> Result<OptionChain, ScrapeError> {
    ChainPayload::from_body(body).map(normalize)
}
