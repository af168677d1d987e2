use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Outcome, Store};
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Removes and returns the first elements of the list stored at `key`.
///
/// With a count of 1, given or implied, the reply is the single element. Any other count replies
/// with an array of at most `count` elements. A missing key replies with `nil`.
///
/// Ref: <https://redis.io/docs/latest/commands/lpop/>
#[derive(Debug, PartialEq)]
pub struct Lpop {
    pub key: String,
    pub count: Option<usize>,
}

impl Executable for Lpop {
    fn exec(self, store: &mut Store, waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        let outcome = store.pop_front(&self.key, self.count.unwrap_or(1))?;

        if !store.contains_key(&self.key) {
            waiters.release(&self.key);
        }

        let popped = match outcome {
            Outcome::Done(Some(popped)) => popped,
            Outcome::Done(None) | Outcome::Expired => return Ok(Frame::Null),
        };

        let res = match self.count {
            None | Some(1) => popped.into_iter().next().map_or(Frame::Null, Frame::Bulk),
            Some(_) => Frame::bulk_array(popped),
        };

        Ok(res)
    }
}

impl TryFrom<&mut CommandParser> for Lpop {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        let count = match parser.has_next() {
            true => {
                let count = parser.next_integer()?;
                let count = usize::try_from(count).map_err(|_| CommandParserError::OutOfRange)?;
                Some(count)
            }
            false => None,
        };

        Ok(Self { key, count })
    }
}
