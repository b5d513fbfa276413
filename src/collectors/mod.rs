pub mod device;
pub mod inventory;
pub mod probe;
pub mod snmp;
