//! Network driver capability set (design note: "Driver registry is a tag ->
//! implementation mapping behind a small capability set"). New drivers are
//! additions to `all_drivers()`, never edits to the trait's callers.

use crate::error::RuntimeResult;
use ipnetwork::Ipv4Network;

/// One concrete networking backend (today: the bridge driver, §4.F).
pub trait NetworkDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create the driver-side kernel object (e.g. a bridge) with the given
    /// gateway CIDR and interface name.
    fn create(&self, cidr: Ipv4Network, name: &str) -> RuntimeResult<()>;

    /// Delete the driver-side kernel object.
    fn delete(&self, name: &str) -> RuntimeResult<()>;

    /// Create a veth pair for `container_id`, enslave the host end to
    /// `network_name`'s bridge, and return the host-side interface name.
    fn connect(&self, network_name: &str, container_id: &str) -> RuntimeResult<String>;

    /// Tear down the veth pair whose host-side name is `host_veth`.
    fn disconnect(&self, host_veth: &str) -> RuntimeResult<()>;
}

/// The tag -> driver-instance registry. `"host"` is handled by the caller
/// before reaching a driver lookup (spec §6: `--net host` attaches nothing).
pub fn lookup(tag: &str) -> RuntimeResult<Box<dyn NetworkDriver>> {
    match tag {
        "bridge" => Ok(Box::new(super::bridge::BridgeDriver)),
        other => Err(crate::error::RuntimeError::UserInput(format!(
            "the driver `{other}` does not exist"
        ))),
    }
}
