use bytes::Bytes;
use tokio::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Set `key` to hold the string `value`. If `key` already holds a value, it is overwritten,
/// regardless of its type. `PX milliseconds` sets the key to expire after the given time.
///
/// Ref: <https://redis.io/docs/latest/commands/set/>
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: String,
    pub value: Bytes,
    pub ttl: Option<Duration>,
}

impl Executable for Set {
    fn exec(self, store: &mut Store, _waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        store.set(self.key, self.value, self.ttl);

        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let value = parser.next_bytes()?;

        let mut ttl = None;

        if parser.has_next() {
            let option = parser.next_string()?;

            match option.to_uppercase().as_str() {
                "PX" => {
                    let millis = parser.next_integer()?;
                    if millis <= 0 {
                        return Err(CommandParserError::InvalidExpireTime { command: "set" }.into());
                    }
                    ttl = Some(Duration::from_millis(millis as u64));
                }
                _ => return Err(CommandParserError::Syntax.into()),
            }
        }

        Ok(Self { key, value, ttl })
    }
}
