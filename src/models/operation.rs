use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single bookable event on a venue: buy, sell, deposit, fee, ...
///
/// Supplied by the external transaction layer; only the fields needed for
/// pricing are modelled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub venue: String,
    pub asset: String,
    pub utc_time: DateTime<Utc>,
    /// Signed quantity; negative for outgoing amounts.
    pub change: Decimal,
}

/// The sold part of an earlier acquisition, priced at the parent operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldPortion {
    pub op: Operation,
    pub sold: Decimal,
}

/// What a cost query prices: a whole operation or the sold part of one.
#[derive(Debug, Clone, Copy)]
pub enum CostQuery<'a> {
    Operation(&'a Operation),
    SoldPortion(&'a SoldPortion),
}

impl<'a> CostQuery<'a> {
    /// The operation whose venue/asset/time determine the unit price
    pub fn operation(&self) -> &'a Operation {
        match self {
            CostQuery::Operation(op) => op,
            CostQuery::SoldPortion(sold) => &sold.op,
        }
    }

    /// The quantity the unit price is scaled by
    pub fn amount(&self) -> Decimal {
        match self {
            CostQuery::Operation(op) => op.change,
            CostQuery::SoldPortion(sold) => sold.sold,
        }
    }
}

impl<'a> From<&'a Operation> for CostQuery<'a> {
    fn from(op: &'a Operation) -> Self {
        CostQuery::Operation(op)
    }
}

impl<'a> From<&'a SoldPortion> for CostQuery<'a> {
    fn from(sold: &'a SoldPortion) -> Self {
        CostQuery::SoldPortion(sold)
    }
}
