use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::store::{Outcome, Store};
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Insert all the specified values at the head of the list stored at `key`.
///
/// Values are inserted one after the other from the leftmost to the rightmost, so
/// `LPUSH mylist a b c` results in a list containing `c` as first element, `b` as second element
/// and `a` as third element.
///
/// Ref: <https://redis.io/docs/latest/commands/lpush/>
#[derive(Debug, PartialEq)]
pub struct Lpush {
    pub key: String,
    pub values: Vec<Bytes>,
}

impl Executable for Lpush {
    fn exec(self, store: &mut Store, waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        match store.push_front(&self.key, self.values)? {
            Outcome::Done(len) => {
                waiters.signal(&self.key);
                Ok(Frame::Integer(len as i64))
            }
            Outcome::Expired => Ok(Frame::Null),
        }
    }
}

impl TryFrom<&mut CommandParser> for Lpush {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let values = parser.remaining_bytes()?;

        Ok(Self { key, values })
    }
}
