pub mod blpop;
pub mod echo;
pub mod executable;
pub mod get;
pub mod llen;
pub mod lpop;
pub mod lpush;
pub mod lrange;
pub mod ping;
pub mod rpush;
pub mod set;

use bytes::Bytes;
use std::str::{self, FromStr};
use std::vec;
use strum_macros::{EnumString, IntoStaticStr};
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;
use crate::Error;

use blpop::Blpop;
use echo::Echo;
use get::Get;
use llen::Llen;
use lpop::Lpop;
use lpush::Lpush;
use lrange::Lrange;
use ping::Ping;
use rpush::Rpush;
use set::Set;

#[derive(Debug, PartialEq)]
pub enum Command {
    Blpop(Blpop),
    Echo(Echo),
    Get(Get),
    Llen(Llen),
    Lpop(Lpop),
    Lpush(Lpush),
    Lrange(Lrange),
    Ping(Ping),
    Rpush(Rpush),
    Set(Set),
}

impl Executable for Command {
    fn exec(self, store: &mut Store, waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        match self {
            // Only the immediate attempt. The dispatcher intercepts BLPOP to park it when the list
            // is empty.
            Command::Blpop(cmd) => cmd.exec(store, waiters),
            Command::Echo(cmd) => cmd.exec(store, waiters),
            Command::Get(cmd) => cmd.exec(store, waiters),
            Command::Llen(cmd) => cmd.exec(store, waiters),
            Command::Lpop(cmd) => cmd.exec(store, waiters),
            Command::Lpush(cmd) => cmd.exec(store, waiters),
            Command::Lrange(cmd) => cmd.exec(store, waiters),
            Command::Ping(cmd) => cmd.exec(store, waiters),
            Command::Rpush(cmd) => cmd.exec(store, waiters),
            Command::Set(cmd) => cmd.exec(store, waiters),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                }
                .into())
            }
        };

        let parser = &mut CommandParser {
            parts: frames.into_iter(),
        };

        let command_name = parser.parse_command_name()?;
        let name = CommandName::from_str(&command_name)
            .map_err(|_| CommandParserError::UnknownCommand {
                command: command_name,
            })?;

        // Arity counts the command name itself, as Redis does.
        if !name.accepts(parser.parts.len() + 1) {
            return Err(CommandParserError::WrongArity {
                command: name.into(),
            }
            .into());
        }

        match name {
            CommandName::Blpop => Blpop::try_from(parser).map(Command::Blpop),
            CommandName::Echo => Echo::try_from(parser).map(Command::Echo),
            CommandName::Get => Get::try_from(parser).map(Command::Get),
            CommandName::Llen => Llen::try_from(parser).map(Command::Llen),
            CommandName::Lpop => Lpop::try_from(parser).map(Command::Lpop),
            CommandName::Lpush => Lpush::try_from(parser).map(Command::Lpush),
            CommandName::Lrange => Lrange::try_from(parser).map(Command::Lrange),
            CommandName::Ping => Ping::try_from(parser).map(Command::Ping),
            CommandName::Rpush => Rpush::try_from(parser).map(Command::Rpush),
            CommandName::Set => Set::try_from(parser).map(Command::Set),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum CommandName {
    Blpop,
    Echo,
    Get,
    Llen,
    Lpop,
    Lpush,
    Lrange,
    Ping,
    Rpush,
    Set,
}

impl CommandName {
    /// Whether a request of `tokens` tokens, command name included, is well formed.
    fn accepts(self, tokens: usize) -> bool {
        match self {
            CommandName::Ping => tokens == 1,
            CommandName::Echo | CommandName::Get | CommandName::Llen => tokens == 2,
            CommandName::Blpop => tokens == 3,
            CommandName::Lrange => tokens == 4,
            CommandName::Lpop => tokens == 2 || tokens == 3,
            CommandName::Set => tokens == 3 || tokens == 5,
            CommandName::Rpush | CommandName::Lpush => tokens >= 3,
        }
    }
}

pub struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn parse_command_name(&mut self) -> Result<String, CommandParserError> {
        self.next_string()
    }

    fn has_next(&self) -> bool {
        self.parts.len() > 0
    }

    fn next_frame(&mut self) -> Result<Frame, CommandParserError> {
        self.parts.next().ok_or(CommandParserError::EndOfStream)
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        match self.next_frame()? {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        match self.next_frame()? {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        match self.next_frame()? {
            Frame::Integer(i) => Ok(i),
            Frame::Simple(string) => string
                .parse::<i64>()
                .map_err(|_| CommandParserError::NotAnInteger),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map_err(CommandParserError::InvalidUTF8String)?
                .parse::<i64>()
                .map_err(|_| CommandParserError::NotAnInteger),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "integer".to_string(),
                actual: frame,
            }),
        }
    }

    /// Reads every remaining part as raw bytes.
    fn remaining_bytes(&mut self) -> Result<Vec<Bytes>, CommandParserError> {
        let mut values = Vec::with_capacity(self.parts.len());
        while self.has_next() {
            values.push(self.next_bytes()?);
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR Protocol error: invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity { command: &'static str },
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR value is out of range, must be positive")]
    OutOfRange,
    #[error("ERR timeout is not a float or out of range")]
    InvalidTimeout,
    #[error("ERR timeout is negative")]
    NegativeTimeout,
    #[error("ERR invalid expire time in '{command}' command")]
    InvalidExpireTime { command: &'static str },
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR Protocol error: invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("ERR Protocol error: empty command")]
    EndOfStream,
}
