//! FT3 frame layout: header fields, formatting and parsing
//!
//! Wire image per IEEE 1815 §§8.1-8.3: a 10-byte header (start bytes
//! `0x05 0x64`, length, control, destination, source, CRC) followed by
//! user data in 16-byte blocks, each block with its own CRC-16/DNP
//! appended LSB-first.

use crate::crc::calc_crc;
use crate::function::LinkFunction;
use dnp3_core::{LinkError, LinkResult};

/// Frame start bytes
pub const SYNC: [u8; 2] = [0x05, 0x64];
/// Header size on the wire, CRC included
pub const HEADER_SIZE: usize = 10;
/// Floor of the length field: control + dest + src, no user data
pub const MIN_LENGTH_FIELD: u8 = 5;
/// Maximum user data octets per frame
pub const MAX_USER_DATA: usize = 250;
/// User data block size between CRCs
pub const DATA_BLOCK_SIZE: usize = 16;
/// Largest possible frame: full header plus 250 data octets in CRC blocks
pub const MAX_FRAME_SIZE: usize = 292;

const MASK_DIR: u8 = 0x80;
const MASK_FCB: u8 = 0x20;
const MASK_FCV_DFC: u8 = 0x10;

/// Parsed header fields of one inbound frame
#[derive(Debug, Clone, Copy)]
pub struct LinkHeaderFields {
    pub func: LinkFunction,
    /// The peer's role bit (DIR)
    pub is_from_master: bool,
    /// Frame count bit
    pub fcb: bool,
    /// Frame-count-valid on primary frames, data-flow-control on
    /// secondary frames; routed through unchanged
    pub fcv_dfc: bool,
    pub dest: u16,
    pub src: u16,
}

impl LinkHeaderFields {
    pub fn new(
        func: LinkFunction,
        is_from_master: bool,
        fcb: bool,
        fcv_dfc: bool,
        dest: u16,
        src: u16,
    ) -> Self {
        Self {
            func,
            is_from_master,
            fcb,
            fcv_dfc,
            dest,
            src,
        }
    }
}

/// Size of `len` user data octets on the wire, block CRCs included
pub fn user_data_wire_size(len: usize) -> usize {
    len + 2 * ((len + DATA_BLOCK_SIZE - 1) / DATA_BLOCK_SIZE)
}

fn control_byte(is_master: bool, fcb: bool, fcv_dfc: bool, func: LinkFunction) -> u8 {
    let mut control = func.to_byte();
    if is_master {
        control |= MASK_DIR;
    }
    if fcb {
        control |= MASK_FCB;
    }
    if fcv_dfc {
        control |= MASK_FCV_DFC;
    }
    control
}

fn format_header(dest: &mut [u8], data_len: u8, control: u8, dest_addr: u16, src_addr: u16) {
    dest[0] = SYNC[0];
    dest[1] = SYNC[1];
    dest[2] = MIN_LENGTH_FIELD + data_len;
    dest[3] = control;
    dest[4..6].copy_from_slice(&dest_addr.to_le_bytes());
    dest[6..8].copy_from_slice(&src_addr.to_le_bytes());
    let crc = calc_crc(&dest[..8]);
    dest[8..10].copy_from_slice(&crc.to_le_bytes());
}

fn format_header_only(
    dest: &mut [u8],
    is_master: bool,
    fcb: bool,
    fcv_dfc: bool,
    func: LinkFunction,
    dest_addr: u16,
    src_addr: u16,
) -> usize {
    debug_assert!(dest.len() >= HEADER_SIZE);
    format_header(
        dest,
        0,
        control_byte(is_master, fcb, fcv_dfc, func),
        dest_addr,
        src_addr,
    );
    HEADER_SIZE
}

fn format_with_user_data(
    dest: &mut [u8],
    control: u8,
    dest_addr: u16,
    src_addr: u16,
    data: &[u8],
) -> usize {
    debug_assert!(data.len() <= MAX_USER_DATA);
    debug_assert!(dest.len() >= HEADER_SIZE + user_data_wire_size(data.len()));
    format_header(dest, data.len() as u8, control, dest_addr, src_addr);
    let mut pos = HEADER_SIZE;
    for block in data.chunks(DATA_BLOCK_SIZE) {
        dest[pos..pos + block.len()].copy_from_slice(block);
        let crc = calc_crc(block);
        dest[pos + block.len()..pos + block.len() + 2].copy_from_slice(&crc.to_le_bytes());
        pos += block.len() + 2;
    }
    pos
}

/// Format an ACK frame, returning the filled length
pub fn format_ack(
    dest: &mut [u8],
    is_master: bool,
    is_rx_buff_full: bool,
    dest_addr: u16,
    src_addr: u16,
) -> usize {
    format_header_only(
        dest,
        is_master,
        false,
        is_rx_buff_full,
        LinkFunction::SecAck,
        dest_addr,
        src_addr,
    )
}

/// Format a NACK frame, returning the filled length
pub fn format_nack(
    dest: &mut [u8],
    is_master: bool,
    is_rx_buff_full: bool,
    dest_addr: u16,
    src_addr: u16,
) -> usize {
    format_header_only(
        dest,
        is_master,
        false,
        is_rx_buff_full,
        LinkFunction::SecNack,
        dest_addr,
        src_addr,
    )
}

/// Format a LINK_STATUS frame, returning the filled length
pub fn format_link_status(
    dest: &mut [u8],
    is_master: bool,
    is_rx_buff_full: bool,
    dest_addr: u16,
    src_addr: u16,
) -> usize {
    format_header_only(
        dest,
        is_master,
        false,
        is_rx_buff_full,
        LinkFunction::SecLinkStatus,
        dest_addr,
        src_addr,
    )
}

/// Format a RESET_LINK_STATES frame, returning the filled length
pub fn format_reset_link_states(
    dest: &mut [u8],
    is_master: bool,
    dest_addr: u16,
    src_addr: u16,
) -> usize {
    format_header_only(
        dest,
        is_master,
        false,
        false,
        LinkFunction::PriResetLinkStates,
        dest_addr,
        src_addr,
    )
}

/// Format a REQUEST_LINK_STATUS frame, returning the filled length
pub fn format_request_link_status(
    dest: &mut [u8],
    is_master: bool,
    dest_addr: u16,
    src_addr: u16,
) -> usize {
    format_header_only(
        dest,
        is_master,
        false,
        false,
        LinkFunction::PriRequestLinkStatus,
        dest_addr,
        src_addr,
    )
}

/// Format a CONFIRMED_USER_DATA frame (FCV set), returning the filled length
pub fn format_confirmed_user_data(
    dest: &mut [u8],
    is_master: bool,
    fcb: bool,
    dest_addr: u16,
    src_addr: u16,
    data: &[u8],
) -> usize {
    format_with_user_data(
        dest,
        control_byte(is_master, fcb, true, LinkFunction::PriConfirmedUserData),
        dest_addr,
        src_addr,
        data,
    )
}

/// Format an UNCONFIRMED_USER_DATA frame, returning the filled length
pub fn format_unconfirmed_user_data(
    dest: &mut [u8],
    is_master: bool,
    dest_addr: u16,
    src_addr: u16,
    data: &[u8],
) -> usize {
    format_with_user_data(
        dest,
        control_byte(is_master, false, false, LinkFunction::PriUnconfirmedUserData),
        dest_addr,
        src_addr,
        data,
    )
}

/// Parse one complete frame image back into header fields and user data
pub fn parse_frame(frame: &[u8]) -> LinkResult<(LinkHeaderFields, Vec<u8>)> {
    if frame.len() < HEADER_SIZE {
        return Err(LinkError::FrameInvalid(format!(
            "Frame too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0..2] != SYNC {
        return Err(LinkError::FrameInvalid(format!(
            "Bad start bytes: 0x{:02X} 0x{:02X}",
            frame[0], frame[1]
        )));
    }
    let length = frame[2];
    if length < MIN_LENGTH_FIELD {
        return Err(LinkError::FrameInvalid(format!(
            "Length field below minimum: {}",
            length
        )));
    }
    let header_crc = u16::from_le_bytes([frame[8], frame[9]]);
    if header_crc != calc_crc(&frame[..8]) {
        return Err(LinkError::FrameInvalid("Header CRC mismatch".to_string()));
    }

    let data_len = (length - MIN_LENGTH_FIELD) as usize;
    let total = HEADER_SIZE + user_data_wire_size(data_len);
    if frame.len() != total {
        return Err(LinkError::FrameInvalid(format!(
            "Expected {} bytes for length field {}, got {}",
            total,
            length,
            frame.len()
        )));
    }

    let control = frame[3];
    let func = LinkFunction::from_control_byte(control).ok_or_else(|| {
        LinkError::FrameInvalid(format!("Unknown function code: 0x{:02X}", control & 0x4F))
    })?;

    let fields = LinkHeaderFields {
        func,
        is_from_master: control & MASK_DIR != 0,
        fcb: control & MASK_FCB != 0,
        fcv_dfc: control & MASK_FCV_DFC != 0,
        dest: u16::from_le_bytes([frame[4], frame[5]]),
        src: u16::from_le_bytes([frame[6], frame[7]]),
    };

    let mut data = Vec::with_capacity(data_len);
    let mut pos = HEADER_SIZE;
    let mut remaining = data_len;
    while remaining > 0 {
        let n = remaining.min(DATA_BLOCK_SIZE);
        let block = &frame[pos..pos + n];
        let crc = u16::from_le_bytes([frame[pos + n], frame[pos + n + 1]]);
        if crc != calc_crc(block) {
            return Err(LinkError::FrameInvalid(format!(
                "User data CRC mismatch at offset {}",
                pos
            )));
        }
        data.extend_from_slice(block);
        pos += n + 2;
        remaining -= n;
    }

    Ok((fields, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_link_states_known_bytes() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = format_reset_link_states(&mut buffer, true, 1, 1024);
        assert_eq!(
            &buffer[..len],
            &[0x05, 0x64, 0x05, 0xC0, 0x01, 0x00, 0x00, 0x04, 0xE9, 0x21]
        );
    }

    #[test]
    fn test_confirmed_user_data_known_bytes() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len =
            format_confirmed_user_data(&mut buffer, true, false, 1024, 1, &[0xC0, 0xC1, 0x01]);
        assert_eq!(
            &buffer[..len],
            &[
                0x05, 0x64, 0x08, 0xD3, 0x00, 0x04, 0x01, 0x00, 0x1A, 0x5A, // header
                0xC0, 0xC1, 0x01, 0x23, 0x0B // one data block
            ]
        );
    }

    #[test]
    fn test_wire_size() {
        assert_eq!(user_data_wire_size(0), 0);
        assert_eq!(user_data_wire_size(1), 3);
        assert_eq!(user_data_wire_size(16), 18);
        assert_eq!(user_data_wire_size(17), 21);
        assert_eq!(user_data_wire_size(250), 282);
    }

    #[test]
    fn test_round_trip_header_only_frames() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = format_ack(&mut buffer, false, true, 1, 1024);
        let (fields, data) = parse_frame(&buffer[..len]).unwrap();
        assert_eq!(fields.func, LinkFunction::SecAck);
        assert!(!fields.is_from_master);
        assert!(!fields.fcb);
        assert!(fields.fcv_dfc);
        assert_eq!(fields.dest, 1);
        assert_eq!(fields.src, 1024);
        assert!(data.is_empty());

        let len = format_request_link_status(&mut buffer, true, 1024, 1);
        let (fields, _) = parse_frame(&buffer[..len]).unwrap();
        assert_eq!(fields.func, LinkFunction::PriRequestLinkStatus);
        assert!(fields.is_from_master);
        assert!(!fields.fcv_dfc);
    }

    #[test]
    fn test_round_trip_user_data_sizes() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        for size in [0usize, 1, 15, 16, 17, 32, 33, 249, 250] {
            let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();
            let len = format_confirmed_user_data(&mut buffer, true, true, 1024, 1, &payload);
            assert_eq!(len, HEADER_SIZE + user_data_wire_size(size));
            let (fields, data) = parse_frame(&buffer[..len]).unwrap();
            assert_eq!(fields.func, LinkFunction::PriConfirmedUserData);
            assert!(fields.fcb);
            assert!(fields.fcv_dfc);
            assert_eq!(data, payload);
        }
    }

    #[test]
    fn test_unconfirmed_clears_fcb_and_fcv() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = format_unconfirmed_user_data(&mut buffer, true, 1024, 1, &[1, 2, 3]);
        let (fields, data) = parse_frame(&buffer[..len]).unwrap();
        assert_eq!(fields.func, LinkFunction::PriUnconfirmedUserData);
        assert!(!fields.fcb);
        assert!(!fields.fcv_dfc);
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_rejects_bad_header_crc() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = format_reset_link_states(&mut buffer, true, 1, 1024);
        buffer[8] ^= 0xFF;
        assert!(parse_frame(&buffer[..len]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_block_crc() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = format_confirmed_user_data(&mut buffer, true, false, 1024, 1, &[0xAA; 20]);
        // corrupt the second block's payload without touching its CRC
        buffer[HEADER_SIZE + 18] ^= 0x01;
        assert!(parse_frame(&buffer[..len]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_sync() {
        let frame = [0x05, 0x65, 0x05, 0xC0, 0x01, 0x00, 0x00, 0x04, 0xE9, 0x21];
        assert!(parse_frame(&frame).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_function() {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = format_reset_link_states(&mut buffer, true, 1, 1024);
        // function 0x05 with PRM set is undefined
        buffer[3] = 0xC5;
        let crc = calc_crc(&buffer[..8]);
        buffer[8..10].copy_from_slice(&crc.to_le_bytes());
        assert!(parse_frame(&buffer[..len]).is_err());
    }
}
