//! Operator commands and their line syntax.
//!
//! # Grammar
//! ```text
//! b <type>          toggle a breakpoint (decimal or 0x hex)
//! a <host> <port>   add a route
//! r <host> <port>   remove a route
//! l                 list routes
//! s <host> <port>   set the default route
//! f                 forward the current record
//! d                 drop the current record
//! c                 continue
//! q                 quit
//! ```

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::codec::RecordType;
use crate::routing::{EndPoint, ResolveError, RouteError};

/// Printed once at startup.
pub const HELP: &str = "\
Interactive record interceptor
Commands
- b <type>         toggle a breakpoint on a record type, e.g. b 23 or b 0x17 for application data
- a <host> <port>  add a route, e.g. a 127.0.0.1 1589
- r <host> <port>  remove a route
- l                list routes
- s <host> <port>  set the default route
- f                forward the current record to the default route
- d                drop the current record
- c                continue without forwarding
- q                quit";

/// Unresolved route argument as typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub host: String,
    pub port: u16,
}

impl RouteTarget {
    /// Resolve to an IPv4 endpoint.
    pub async fn resolve(&self) -> Result<EndPoint, ResolveError> {
        EndPoint::resolve(&self.host, self.port).await
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Break(RecordType),
    AddRoute(RouteTarget),
    RemoveRoute(RouteTarget),
    ListRoutes,
    SetDefault(RouteTarget),
    Forward,
    Drop,
    Continue,
    Quit,
}

/// Operator-facing failures. Reported, then the prompt is shown again.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Wrong syntax: {0}")]
    Syntax(String),

    #[error("Bad arguments: {0}")]
    BadArguments(String),

    #[error("No record")]
    NoRecord,

    #[error("No default route")]
    NoDefaultRoute,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = tokens.split_first() else {
            return Err(CommandError::Syntax("empty command".into()));
        };

        let expected = match name {
            "b" => 1,
            "a" | "r" | "s" => 2,
            "l" | "f" | "d" | "c" | "q" => 0,
            other => return Err(CommandError::Syntax(format!("unknown command '{other}'"))),
        };
        if args.len() != expected {
            return Err(CommandError::Syntax(format!(
                "'{name}' takes {expected} argument(s), got {}",
                args.len()
            )));
        }

        let command = match name {
            "b" => Command::Break(parse_record_type(args[0])?),
            "a" => Command::AddRoute(parse_target(args)?),
            "r" => Command::RemoveRoute(parse_target(args)?),
            "s" => Command::SetDefault(parse_target(args)?),
            "l" => Command::ListRoutes,
            "f" => Command::Forward,
            "d" => Command::Drop,
            "c" => Command::Continue,
            _ => Command::Quit,
        };
        Ok(command)
    }
}

fn parse_record_type(arg: &str) -> Result<RecordType, CommandError> {
    let value = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => arg.parse::<u8>(),
    }
    .map_err(|_| CommandError::BadArguments(format!("'{arg}' is not a record type number")))?;

    RecordType::try_from(value)
        .map_err(|b| CommandError::BadArguments(format!("{b:#04x} is not a record type (0x14..=0x18)")))
}

fn parse_target(args: &[&str]) -> Result<RouteTarget, CommandError> {
    let port = args[1]
        .parse::<u16>()
        .map_err(|_| CommandError::BadArguments(format!("'{}' is not a port", args[1])))?;
    Ok(RouteTarget {
        host: args[0].to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str, port: u16) -> RouteTarget {
        RouteTarget {
            host: host.into(),
            port,
        }
    }

    #[test]
    fn parses_every_command() {
        assert_eq!("b 23".parse::<Command>().unwrap(), Command::Break(RecordType::ApplicationData));
        assert_eq!("b 0x16".parse::<Command>().unwrap(), Command::Break(RecordType::Handshake));
        assert_eq!(
            "a 127.0.0.1 9000".parse::<Command>().unwrap(),
            Command::AddRoute(target("127.0.0.1", 9000))
        );
        assert_eq!(
            "r localhost 1".parse::<Command>().unwrap(),
            Command::RemoveRoute(target("localhost", 1))
        );
        assert_eq!(
            "s 10.0.0.1 443".parse::<Command>().unwrap(),
            Command::SetDefault(target("10.0.0.1", 443))
        );
        assert_eq!("l".parse::<Command>().unwrap(), Command::ListRoutes);
        assert_eq!("f".parse::<Command>().unwrap(), Command::Forward);
        assert_eq!("d".parse::<Command>().unwrap(), Command::Drop);
        assert_eq!("c".parse::<Command>().unwrap(), Command::Continue);
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!("   f \r\n".parse::<Command>().unwrap(), Command::Forward);
        assert_eq!(
            "\ta   host   80  ".parse::<Command>().unwrap(),
            Command::AddRoute(target("host", 80))
        );
    }

    #[test]
    fn unknown_or_wrong_arity_is_syntax_error() {
        for line in ["", "   ", "x", "forward", "b", "b 1 2", "a host", "l extra", "q now"] {
            let err = line.parse::<Command>().unwrap_err();
            assert!(matches!(err, CommandError::Syntax(_)), "{line:?} gave {err:?}");
        }
    }

    #[test]
    fn bad_numbers_are_bad_arguments() {
        for line in ["b 19", "b 0x19", "b 256", "b zz", "b 0x", "a host port", "s host 70000"] {
            let err = line.parse::<Command>().unwrap_err();
            assert!(matches!(err, CommandError::BadArguments(_)), "{line:?} gave {err:?}");
        }
    }

    #[test]
    fn errors_render_for_the_operator() {
        assert_eq!(CommandError::NoRecord.to_string(), "No record");
        let err = "b 0x19".parse::<Command>().unwrap_err();
        assert!(err.to_string().contains("0x19"));
    }
}
