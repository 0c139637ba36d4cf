mod engine;
pub use self::engine::*;

mod table;
pub use self::table::{ArpRecord, ArpState, ArpTable, Learned, Lookup, PendingOutbound, TimerActions};
