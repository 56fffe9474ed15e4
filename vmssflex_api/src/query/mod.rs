mod common;
pub(crate) use self::common::with_api_version;
pub use self::common::{ApiVersion, Query};

mod vm_list;
pub use self::vm_list::FlexVmListQuery;

mod graph;
pub use self::graph::ComputerNameQuery;
