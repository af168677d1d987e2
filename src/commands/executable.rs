use crate::frame::Frame;
use crate::store::Store;
use crate::waiters::WaiterRegistry;
use crate::Error;

pub trait Executable {
    fn exec(self, store: &mut Store, waiters: &mut WaiterRegistry) -> Result<Frame, Error>;
}
