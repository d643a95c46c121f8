//! BLE GATT Service Protocol Constants for the FOTA service
//!
//! Control characteristic op codes. The service and characteristic UUIDs
//! live with the transport as `uuid::Uuid` values.

/// Control characteristic op codes
pub mod commands {
    /// Open a FOTA session. The device answers with XON once it is ready.
    pub const START: u8 = 0x01;

    /// Abort the current session
    pub const STOP: u8 = 0x02;

    /// All fragments sent, validate and install the image
    pub const COMMIT: u8 = 0x03;

    /// Ask the device to report XOFF
    pub const SET_XOFF: u8 = 0x41;

    /// Ask the device to report XON
    pub const SET_XON: u8 = 0x42;

    /// Set the fragment id the device expects next
    pub const SET_FRAGMENT_ID: u8 = 0x43;
}
