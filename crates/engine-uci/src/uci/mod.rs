//! UCI protocol support

mod options;
mod parser;
mod output;

pub use options::{OptionKind, OptionRegistry};
pub use output::{format_info, format_move, parse_move};
pub use parser::{parse_command, GoParams, UciCommand};
