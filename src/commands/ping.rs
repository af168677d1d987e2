use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;
use crate::Error;

/// Returns PONG. Useful to test whether a connection is still alive.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
#[derive(Debug, PartialEq)]
pub struct Ping;

impl Executable for Ping {
    fn exec(self, _store: &mut Store, _waiters: &mut WaiterRegistry) -> Result<Frame, Error> {
        Ok(Frame::Simple("PONG".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Ping {
    type Error = Error;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::commands::Command;

    #[test]
    fn pong() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("PING"))]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(cmd, Command::Ping(Ping));

        let res = cmd
            .exec(&mut Store::new(), &mut WaiterRegistry::new())
            .unwrap();

        assert_eq!(res, Frame::Simple("PONG".to_string()));
        assert_eq!(res.serialize(), b"+PONG\r\n");
    }
}
