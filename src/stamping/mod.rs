//! Reusable stamping primitives.
//!
//! Every stamper follows the same two-step protocol: `register` binds the
//! proxies for its terminals while the adapter is open, `stamp` writes the
//! companion values through those proxies on every iteration.
//!
//! Sign convention: a current `i` stamped between `anode` and `cathode`
//! flows from the anode through the device into the cathode, so it leaves
//! the anode node and enters the cathode node.

mod basic;
mod bjt;
mod branch;
mod controlled;

pub use basic::{ConductanceStamper, CurrentStamper, VoltageProxy};
pub use bjt::{BjtStamper, BjtStampValues};
pub use branch::VoltageStamper;
pub use controlled::{CccsStamper, CcvsStamper, VccsStamper, VcvsStamper};
