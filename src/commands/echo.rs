use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Returns `message`.
///
/// Ref: <https://redis.io/docs/latest/commands/echo>
#[derive(Debug, PartialEq)]
pub struct Echo {
    pub message: Bytes,
}

impl Executable for Echo {
    fn exec(self, _store: &mut Store, _waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        Ok(Frame::Bulk(self.message))
    }
}

impl TryFrom<&mut CommandParser> for Echo {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let message = parser.next_bytes()?;
        Ok(Self { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    #[test]
    fn echoes_message() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("ECHO")),
            Frame::Bulk(Bytes::from("Hello, World!")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Echo(Echo {
                message: Bytes::from("Hello, World!")
            })
        );

        let res = cmd
            .exec(&mut Store::new(), &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(res, Frame::Bulk(Bytes::from("Hello, World!")));
    }
}
