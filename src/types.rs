use crate::GoIoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed set of vendor constants.
///
/// Every variant gets a wire code and the vendor's spelling of its name.
/// Codes convert back with `TryFrom`, names parse case-insensitively with
/// `FromStr`; anything outside the set is an error.
macro_rules! vendor_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $repr:ty as $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr($repr)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $code, )+
        }

        impl $name {
            /// Every member of the set, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire code of this constant.
            pub const fn code(self) -> $repr {
                self as $repr
            }

            /// Vendor spelling of this constant.
            pub const fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }

            /// All vendor names, in declaration order.
            pub fn names() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.name()).collect()
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = GoIoError;

            fn try_from(code: $repr) -> Result<Self, GoIoError> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.code() == code)
                    .ok_or(GoIoError::InvalidCode {
                        kind: $kind,
                        code: code as i64,
                    })
            }
        }

        impl FromStr for $name {
            type Err = GoIoError;

            fn from_str(s: &str) -> Result<Self, GoIoError> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| GoIoError::InvalidName {
                        kind: $kind,
                        name: s.to_string(),
                        expected: Self::names().join(", "),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

vendor_enum! {
    /// USB vendor id of Vernier devices.
    pub enum VendorId: i32 as "vendor" {
        Vernier = 0x08F7 => "Vernier",
    }
}

vendor_enum! {
    /// USB product ids of the GoIO device family.
    pub enum ProductId: i32 as "product" {
        Default = 0x0001 => "Default",
        GoTemp = 0x0002 => "GoTemp",
        GoLink = 0x0003 => "GoLink",
        GoMotion = 0x0004 => "GoMotion",
        LabQuest = 0x0005 => "LabQuest",
    }
}

vendor_enum! {
    /// Command bytes accepted by `GoIO_Sensor_SendCmdAndGetResponse`.
    pub enum SensorCommand: u8 as "command" {
        /// Reported by the DLL when no command has been sent yet.
        NoCommand = 0x00 => "NONE",
        GetStatus = 0x10 => "GET_STATUS",
        StartMeasurements = 0x18 => "START_MEASUREMENTS",
        StopMeasurements = 0x19 => "STOP_MEASUREMENTS",
        Init = 0x1A => "INIT",
        SetMeasurementPeriod = 0x1B => "SET_MEASUREMENT_PERIOD",
        GetMeasurementPeriod = 0x1C => "GET_MEASUREMENT_PERIOD",
        SetLedState = 0x1D => "SET_LED_STATE",
        GetLedState = 0x1E => "GET_LED_STATE",
        GetSerialNumber = 0x20 => "GET_SERIAL_NUMBER",
        GetSensorId = 0x28 => "GET_SENSOR_ID",
        SetAnalogInputChannel = 0x29 => "SET_ANALOG_INPUT_CHANNEL",
        GetAnalogInputChannel = 0x2A => "GET_ANALOG_INPUT_CHANNEL",
    }
}

vendor_enum! {
    /// Status byte reported by the sensor firmware.
    pub enum SensorStatus: u8 as "status" {
        Success = 0x00 => "SUCCESS",
        NotReadyForNewCmd = 0x30 => "NOT_READY_FOR_NEW_CMD",
        CmdNotSupported = 0x31 => "CMD_NOT_SUPPORTED",
        InternalError1 = 0x32 => "INTERNAL_ERROR1",
        InternalError2 = 0x33 => "INTERNAL_ERROR2",
        CannotChangePeriodWhileCollecting = 0x34 => "ERROR_CANNOT_CHANGE_PERIOD_WHILE_COLLECTING",
        CannotReadNvMemBlkWhileCollectingFast = 0x35 => "ERROR_CANNOT_READ_NV_MEM_BLK_WHILE_COLLECTING_FAST",
        InvalidParameter = 0x36 => "ERROR_INVALID_PARAMETER",
        CannotWriteFlashWhileCollecting = 0x37 => "ERROR_CANNOT_WRITE_FLASH_WHILE_COLLECTING",
        CannotWriteFlashWhileHostFifoBusy = 0x38 => "ERROR_CANNOT_WRITE_FLASH_WHILE_HOST_FIFO_BUSY",
        OpBlockedWhileCollecting = 0x39 => "ERROR_OP_BLOCKED_WHILE_COLLECTING",
        CalculatorCannotMeasureWithNoBatteries = 0x3A => "ERROR_CALCULATOR_CANNOT_MEASURE_WITH_NO_BATTERIES",
        SlavePowerupInit = 0x40 => "ERROR_SLAVE_POWERUP_INIT",
        SlavePowerrestoreInit = 0x41 => "ERROR_SLAVE_POWERRESTORE_INIT",
        Communication = 0xF0 => "ERROR_COMMUNICATION",
    }
}

vendor_enum! {
    /// LED color byte of the `SET_LED_STATE` parameter.
    pub enum LedColor: u8 as "LED color" {
        Black = 0xC0 => "BLACK",
        Red = 0x40 => "RED",
        Green = 0x80 => "GREEN",
        RedGreen = 0x00 => "RED_GREEN",
    }
}

vendor_enum! {
    /// LED brightness byte of the `SET_LED_STATE` parameter.
    pub enum LedBrightness: u8 as "LED brightness" {
        Min = 0x00 => "BRIGHTNESS_MIN",
        /// Brightness that renders RED_GREEN as orange.
        Orange = 0x04 => "ORANGE",
        Max = 0x10 => "BRIGHTNESS_MAX",
    }
}

vendor_enum! {
    /// Probe type reported by `GoIO_Sensor_GetProbeType`.
    pub enum ProbeType: i32 as "probe type" {
        NoProbe = 0 => "NoProbe",
        Analog5V = 2 => "Analog5V",
        Analog10V = 3 => "Analog10V",
        HeatPulser = 4 => "HeatPulser",
        AnalogOut = 5 => "AnalogOut",
        MotionDetector = 6 => "MD",
        PhotoGate = 7 => "PhotoGate",
        DigitalCount = 10 => "DigitalCount",
        Rotary = 11 => "Rotary",
        DigitalOut = 12 => "DigitalOut",
        LabquestAudio = 13 => "LabquestAudio",
    }
}

/// Opaque vendor handle of an open sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorHandle(pub u64);

impl fmt::Display for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Identification of an open sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub handle: SensorHandle,
    pub name: String,
    pub vendor: VendorId,
    pub product: ProductId,
}

impl fmt::Display for SensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) handle={}",
            self.vendor, self.product, self.name, self.handle
        )
    }
}

/// Result of `GoIO_Sensor_GetLastCmdResponseStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorErrorStatus {
    pub last_command: SensorCommand,
    pub last_status: SensorStatus,
    pub last_command_with_error: SensorCommand,
    pub last_error: SensorStatus,
}

/// GoIO_DLL version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DllVersion {
    pub major: u16,
    pub minor: u16,
}

impl fmt::Display for DllVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
