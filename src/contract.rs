//! Lottery Move package: call construction and object decoding

use crate::types::{LedgerObject, ObjectId, TicketNumber};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const MODULE: &str = "lottery";

pub const FN_BUY: &str = "buy_ticket";
pub const FN_DRAW: &str = "draw_lucky";
pub const FN_CHECK: &str = "check_winner";

/// Struct names of objects the package creates
pub const TYPE_TICKET: &str = "LotteryBox";
pub const TYPE_LUCKY: &str = "LuckyNumber";
pub const TYPE_WINNER: &str = "Winner";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    U16(u16),
    Object(ObjectId),
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::U16(n) => write!(f, "{}u16", n),
            CallArg::Object(id) => write!(f, "@{}", id),
        }
    }
}

/// A single Move call, ready to hand to the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
    pub arguments: Vec<CallArg>,
}

impl MoveCall {
    fn new(package: &str, function: &str, arguments: Vec<CallArg>) -> Self {
        Self {
            package: package.to_string(),
            module: MODULE.to_string(),
            function: function.to_string(),
            arguments,
        }
    }

    /// `package::module::function`
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

pub fn buy_ticket(package: &str, number: TicketNumber) -> MoveCall {
    MoveCall::new(package, FN_BUY, vec![CallArg::U16(number.value())])
}

pub fn draw_lucky(package: &str) -> MoveCall {
    MoveCall::new(package, FN_DRAW, Vec::new())
}

pub fn check_winner(package: &str, ticket: &ObjectId, lucky: &ObjectId) -> MoveCall {
    MoveCall::new(
        package,
        FN_CHECK,
        vec![CallArg::Object(ticket.clone()), CallArg::Object(lucky.clone())],
    )
}

/// Fully qualified type tag for a struct of the lottery module
pub fn type_tag(package: &str, struct_name: &str) -> String {
    format!("{}::{}::{}", package, MODULE, struct_name)
}

/// Whether `object` is a `struct_name` of this package. Generic
/// instantiations (`Foo<T>`) match on the base type.
pub fn is_type(object: &LedgerObject, package: &str, struct_name: &str) -> bool {
    let base = object
        .object_type
        .split_once('<')
        .map(|(b, _)| b)
        .unwrap_or(&object.object_type);
    base == type_tag(package, struct_name)
}

/// Move integers wider than 53 bits are rendered as decimal strings
fn as_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Ticket number held by a `LotteryBox`: `{ticket: {fields: {number}}}`
pub fn parse_ticket_number(object: &LedgerObject) -> Option<u16> {
    let n = as_number(object.content.get("ticket")?.get("fields")?.get("number")?)?;
    u16::try_from(n).ok()
}

/// Value held by a `LuckyNumber`: `{number}`
pub fn parse_lucky_number(object: &LedgerObject) -> Option<u64> {
    as_number(object.content.get("number")?)
}
