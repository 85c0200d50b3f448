use crate::types::{LedBrightness, LedColor, SensorStatus};
use serde::{Deserialize, Serialize};

// -- Library limits --
/// Size of the buffers used to exchange device names with the DLL.
pub const MAX_SIZE_DEVICE_NAME: usize = 256;

/// Timeout passed to `GoIO_Sensor_SendCmdAndGetResponse` and the measurement
/// period calls.
pub const DEFAULT_CMD_TIMEOUT_MS: i32 = 1000;

/// `strictDDSValidationFlag` passed to `GoIO_Sensor_Open`.
pub const STRICT_DDS_VALIDATION: i32 = 1;

/// A fixed-layout parameter or response record of a sensor command.
///
/// `SIZE` is the exact byte count the DLL expects; `encode` always yields
/// `SIZE` bytes and `decode` rejects any other length.
pub trait WireRecord: Sized {
    const SIZE: usize;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Option<Self>;
}

/// One-byte response carrying the firmware status.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultResponse {
    pub status: u8,
}

impl DefaultResponse {
    pub fn status(&self) -> crate::Result<SensorStatus> {
        SensorStatus::try_from(self.status)
    }
}

impl WireRecord for DefaultResponse {
    const SIZE: usize = 1;

    fn encode(&self) -> Vec<u8> {
        vec![self.status]
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [status] => Some(Self { status: *status }),
            _ => None,
        }
    }
}

/// `SET_LED_STATE` parameter and `GET_LED_STATE` response.
/// Layout: `[color, brightness]`. Defaults to bright green.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedParam {
    pub color: u8,
    pub brightness: u8,
}

impl Default for LedParam {
    fn default() -> Self {
        Self::new(LedColor::Green, LedBrightness::Max)
    }
}

impl LedParam {
    pub fn new(color: LedColor, brightness: LedBrightness) -> Self {
        Self {
            color: color.code(),
            brightness: brightness.code(),
        }
    }

    pub fn color(&self) -> crate::Result<LedColor> {
        LedColor::try_from(self.color)
    }

    pub fn brightness(&self) -> crate::Result<LedBrightness> {
        LedBrightness::try_from(self.brightness)
    }
}

impl WireRecord for LedParam {
    const SIZE: usize = 2;

    fn encode(&self) -> Vec<u8> {
        vec![self.color, self.brightness]
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [color, brightness] => Some(Self {
                color: *color,
                brightness: *brightness,
            }),
            _ => None,
        }
    }
}

/// Extract a NUL-terminated string from a name buffer.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

/// Copy `s` into a NUL-terminated buffer of `MAX_SIZE_DEVICE_NAME` bytes,
/// truncating if needed.
pub fn name_buffer(s: &str) -> [u8; MAX_SIZE_DEVICE_NAME] {
    let mut buf = [0u8; MAX_SIZE_DEVICE_NAME];
    let bytes = s.as_bytes();
    let len = bytes.len().min(MAX_SIZE_DEVICE_NAME - 1);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_match_layout() {
        assert_eq!(std::mem::size_of::<LedParam>(), LedParam::SIZE);
        assert_eq!(std::mem::size_of::<LedParam>(), 2);
        assert_eq!(std::mem::size_of::<DefaultResponse>(), DefaultResponse::SIZE);
        assert_eq!(std::mem::size_of::<DefaultResponse>(), 1);
        assert_eq!(LedParam::default().encode().len(), LedParam::SIZE);
        assert_eq!(DefaultResponse::default().encode().len(), DefaultResponse::SIZE);
    }

    #[test]
    fn test_led_param_layout() {
        let param = LedParam::new(LedColor::Red, LedBrightness::Max);
        assert_eq!(param.encode(), vec![0x40, 0x10]);
        assert_eq!(param.color().unwrap(), LedColor::Red);
        assert_eq!(param.brightness().unwrap(), LedBrightness::Max);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(LedParam::decode(&[0x80]).is_none());
        assert!(LedParam::decode(&[0x80, 0x10, 0x00]).is_none());
        assert!(DefaultResponse::decode(&[]).is_none());
        assert_eq!(
            DefaultResponse::decode(&[0x31]).unwrap().status().unwrap(),
            SensorStatus::CmdNotSupported
        );
    }

    #[test]
    fn test_name_buffer_roundtrip_and_truncation() {
        let buf = name_buffer("\\\\?\\hid#vid_08f7&pid_0003");
        assert_eq!(extract_string(&buf), "\\\\?\\hid#vid_08f7&pid_0003");

        let long = "x".repeat(400);
        let buf = name_buffer(&long);
        assert_eq!(buf[MAX_SIZE_DEVICE_NAME - 1], 0);
        assert_eq!(extract_string(&buf).len(), MAX_SIZE_DEVICE_NAME - 1);
    }
}
