//! Finder wire format: command strings and binary chunk frames.
//!
//! Frame layout (4112 bytes, all integers big-endian):
//! - Magic (4 bytes): 5a 5a a5 a5
//! - Part index (4 bytes)
//! - Part length (4 bytes, unpadded)
//! - CRC32 of the unpadded data (4 bytes)
//! - Data (4096 bytes, zero padded)

use super::error::FrameError;

/// Frame magic bytes.
pub const FRAME_MAGIC: [u8; 4] = [0x5a, 0x5a, 0xa5, 0xa5];

/// Payload bytes carried by one frame.
pub const CHUNK_SIZE: usize = 4096;

/// Frame header size (magic + index + length + crc).
pub const FRAME_HEADER_SIZE: usize = 16;

/// Total size of an encoded frame.
pub const FRAME_SIZE: usize = FRAME_HEADER_SIZE + CHUNK_SIZE;

/// Largest response read from the device per exchange.
pub const MAX_RESPONSE: usize = 128;

/// Default TCP port of the printer.
pub const DEFAULT_PORT: u16 = 8899;

/// Directory on the printer that receives uploads.
pub const DEVICE_DIR: &str = "0:/user/";

/// Longest file name (in characters) the printer accepts.
pub const MAX_NAME_CHARS: usize = 32;

// Expected response prefixes
pub const RESP_INIT: &str = "CMD M601 Received.\r\nControl Success.";
pub const RESP_START_UPLOAD: &str = "CMD M650 Received.\r\nX:";
pub const RESP_CREATE_FILE: &str = "CMD M28 Received.\r\nWriting to file:";
pub const RESP_SAVE_FILE: &str = "CMD M29 Received.\r\nDone saving file.";
pub const RESP_START_PRINT: &str = "CMD M23 Received.\r\nFile opened:";

/// Marker the printer puts in a rejected chunk response.
pub const CHUNK_ERROR_MARKER: &str = "error";

/// A decoded chunk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub part_index: u32,
    pub part_length: u32,
    pub crc32: u32,
    /// Full 4096-byte body including padding.
    pub data: Vec<u8>,
}

impl Frame {
    /// Data without the zero padding.
    ///
    /// A `part_length` beyond the body is clamped to the body length.
    pub fn payload(&self) -> &[u8] {
        let len = (self.part_length as usize).min(self.data.len());
        &self.data[..len]
    }
}

/// CRC-32 (IEEE) of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encode a command line for the wire.
///
/// The caller supplies the trailing `\r\n`.
pub fn encode_command(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Build a chunk frame.
///
/// `data` must not exceed [`CHUNK_SIZE`]; the body is zero padded but the
/// header keeps the real length and the CRC of the unpadded bytes.
pub fn encode_frame(part_index: u32, data: &[u8]) -> Vec<u8> {
    assert!(data.len() <= CHUNK_SIZE, "chunk of {} bytes exceeds {CHUNK_SIZE}", data.len());

    let mut frame = Vec::with_capacity(FRAME_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&part_index.to_be_bytes());
    frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
    frame.extend_from_slice(&checksum(data).to_be_bytes());
    frame.extend_from_slice(data);
    frame.resize(FRAME_SIZE, 0);
    frame
}

/// Parse and verify a chunk frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() != FRAME_SIZE {
        return Err(FrameError::Length {
            expected: FRAME_SIZE,
            actual: bytes.len(),
        });
    }

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != FRAME_MAGIC {
        return Err(FrameError::Magic(magic));
    }

    let part_index = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let part_length = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let crc32 = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    if part_length as usize > CHUNK_SIZE {
        return Err(FrameError::PartLength(part_length));
    }

    let data = bytes[FRAME_HEADER_SIZE..].to_vec();
    let actual = checksum(&data[..part_length as usize]);
    if actual != crc32 {
        return Err(FrameError::Crc { expected: crc32, actual });
    }

    Ok(Frame {
        part_index,
        part_length,
        crc32,
        data,
    })
}

/// Decode a device response; an empty slice means "no response".
pub fn decode_response(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Path of the uploaded file on the printer.
///
/// Names longer than 32 characters are truncated.
pub fn device_path(file_name: &str) -> String {
    let name: String = file_name.chars().take(MAX_NAME_CHARS).collect();
    format!("{DEVICE_DIR}{name}.g")
}

pub fn init_command() -> String {
    "~M601 S1\r\n".to_string()
}

pub fn start_upload_command() -> String {
    "~M650\r\n".to_string()
}

/// `~M28 <length> <path>`: announce a new file of `length` bytes.
pub fn create_file_command(length: usize, file_name: &str) -> String {
    format!("~M28 {length} {}\r\n", device_path(file_name))
}

pub fn save_file_command() -> String {
    "~M29\r\n".to_string()
}

/// `~M23 <path>`: open the file and start printing it.
pub fn start_print_command(file_name: &str) -> String {
    format!("~M23 {}\r\n", device_path(file_name))
}

/// Number of frames needed for a payload of `len` bytes.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(7, b"G1 X1\n");
        assert_eq!(frame.len(), FRAME_SIZE);
        assert_eq!(&frame[0..4], &FRAME_MAGIC);
        assert_eq!(&frame[4..8], &[0, 0, 0, 7]);
        assert_eq!(&frame[8..12], &[0, 0, 0, 6]);
        assert_eq!(&frame[16..22], b"G1 X1\n");
        assert!(frame[22..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_crc_covers_unpadded_data_only() {
        let data = b"G28\nG1 Z5\n";
        let frame = encode_frame(0, data);
        let stored = u32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]);

        assert_eq!(stored, checksum(data));
        assert_ne!(stored, checksum(&frame[FRAME_HEADER_SIZE..]));
    }

    #[test]
    fn test_crc_known_value() {
        // Standard CRC-32 check value
        assert_eq!(checksum(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn test_decode_frame_lengths() {
        for len in [0usize, 1, 10, 4095, 4096] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8 + 1).collect();
            let frame = decode_frame(&encode_frame(3, &data)).unwrap();

            assert_eq!(frame.part_index, 3);
            assert_eq!(frame.part_length as usize, len);
            assert_eq!(frame.payload(), data.as_slice());
            assert!(frame.data[len..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_decode_frame_rejects_corruption() {
        let mut frame = encode_frame(0, b"G1 X1\n");
        frame[16] = b'H';
        assert!(matches!(decode_frame(&frame), Err(FrameError::Crc { .. })));

        let mut frame = encode_frame(0, b"G1 X1\n");
        frame[0] = 0;
        assert!(matches!(decode_frame(&frame), Err(FrameError::Magic(_))));

        assert_eq!(
            decode_frame(&[0u8; 20]),
            Err(FrameError::Length {
                expected: FRAME_SIZE,
                actual: 20
            })
        );
    }

    #[test]
    fn test_payload_clamps_inconsistent_length() {
        let frame = Frame {
            part_index: 0,
            part_length: 5000,
            crc32: 0,
            data: b"G28\n".to_vec(),
        };
        assert_eq!(frame.payload(), b"G28\n");
    }

    #[test]
    #[should_panic]
    fn test_encode_frame_oversized() {
        encode_frame(0, &[0u8; CHUNK_SIZE + 1]);
    }

    #[test]
    fn test_device_path_truncates() {
        assert_eq!(device_path("cube"), "0:/user/cube.g");

        let long = "a".repeat(40);
        assert_eq!(device_path(&long), format!("0:/user/{}.g", "a".repeat(32)));
    }

    #[test]
    fn test_device_path_counts_characters() {
        let name = "é".repeat(33);
        assert_eq!(device_path(&name), format!("0:/user/{}.g", "é".repeat(32)));
    }

    #[test]
    fn test_commands() {
        assert_eq!(init_command(), "~M601 S1\r\n");
        assert_eq!(start_upload_command(), "~M650\r\n");
        assert_eq!(create_file_command(12, "cube"), "~M28 12 0:/user/cube.g\r\n");
        assert_eq!(save_file_command(), "~M29\r\n");
        assert_eq!(start_print_command("cube"), "~M23 0:/user/cube.g\r\n");
        assert_eq!(encode_command("~M29\r\n"), b"~M29\r\n".to_vec());
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(4096), 1);
        assert_eq!(chunk_count(4097), 2);
        assert_eq!(chunk_count(8192), 2);
    }

    #[test]
    fn test_decode_response() {
        assert_eq!(decode_response(b""), "");
        assert_eq!(decode_response(b"CMD M29 Received.\r\n"), "CMD M29 Received.\r\n");
    }
}
