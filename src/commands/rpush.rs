use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::store::{Outcome, Store};
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Insert all the specified values at the tail of the list stored at `key`. If `key` does not
/// exist, it is created as an empty list before performing the push operation. When `key` holds a
/// value that is not a list, an error is returned.
///
/// Replies with the length of the list after the push. Clients blocked on `key` are signalled.
///
/// Ref: <https://redis.io/docs/latest/commands/rpush/>
#[derive(Debug, PartialEq)]
pub struct Rpush {
    pub key: String,
    pub values: Vec<Bytes>,
}

impl Executable for Rpush {
    fn exec(self, store: &mut Store, waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        match store.push_back(&self.key, self.values)? {
            Outcome::Done(len) => {
                waiters.signal(&self.key);
                Ok(Frame::Integer(len as i64))
            }
            Outcome::Expired => Ok(Frame::Null),
        }
    }
}

impl TryFrom<&mut CommandParser> for Rpush {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let values = parser.remaining_bytes()?;

        Ok(Self { key, values })
    }
}
