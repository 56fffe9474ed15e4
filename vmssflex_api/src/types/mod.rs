mod meta;
pub use self::meta::{ListResult, QueryResponse};

mod scale_set;
pub use self::scale_set::{OrchestrationMode, ScaleSet};

mod virtual_machine;
pub use self::virtual_machine::{InstanceView, InstanceViewStatus, VirtualMachine};
