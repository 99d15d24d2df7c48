use crate::controller::{TecsMode, TecsStatus};
use zerocopy::IntoBytes;

// ---------------------------------------------------------------------------
// 1. Quantization helpers
// ---------------------------------------------------------------------------

/// Maps a 0..1 actuator fraction to the full u8 range.
#[inline]
pub fn unit_to_u8(x: f32) -> u8 {
    (x.clamp(0.0, 1.0) * 255.0) as u8
}

/// Maps a quantized actuator fraction back to 0..1.
#[inline]
pub fn u8_to_unit(v: u8) -> f32 {
    v as f32 / 255.0
}

/// Maps an angle in radians to centi-degrees. Saturates at the i16 range
/// (±327°), far beyond any pitch limit.
#[inline]
pub fn rad_to_cdeg(x: f32) -> i16 {
    (x.to_degrees() * 100.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Maps centi-degrees back to radians.
#[inline]
pub fn cdeg_to_rad(v: i16) -> f32 {
    (v as f32 / 100.0).to_radians()
}

#[inline]
fn sat_i16(x: f32) -> i16 {
    x.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

// ---------------------------------------------------------------------------
// 2. Frame structs (zero-copy)
// ---------------------------------------------------------------------------

/// Full-resolution controller status (21 bytes).
/// Used as the keyframe in the downlink stream.
#[repr(C, packed)]
#[derive(zerocopy::IntoBytes, zerocopy::Immutable, Clone, Copy, Debug, PartialEq)]
pub struct StatusFrame {
    pub time_ms: u32,          // Tick time (ms, wraps after ~49 days)
    pub hgt_sp_dm: i32,        // Height setpoint (dm AMSL) - High Res!
    pub hgt_rate_sp_cm_s: i16, // Height-rate setpoint (cm/s)
    pub tas_cm_s: u16,         // Smoothed TAS (cm/s)
    pub ste_error: i16,        // Total energy error (m²/s², saturated)
    pub seb_error: i16,        // Energy balance error (m²/s², saturated)
    pub pitch_cdeg: i16,       // Pitch setpoint (centi-degrees)
    pub throttle: u8,          // Quantized throttle (0-255)
    pub undersped: u8,         // Quantized underspeed ramp (0-255)
    pub mode: u8,              // TecsMode discriminant
}

impl StatusFrame {
    pub fn from_status(time_ms: u32, status: &TecsStatus) -> Self {
        Self {
            time_ms,
            hgt_sp_dm: (status.hgt_setpoint * 10.0) as i32,
            hgt_rate_sp_cm_s: sat_i16(status.hgt_rate_setpoint * 100.0),
            tas_cm_s: (status.tas.max(0.0) * 100.0).min(u16::MAX as f32) as u16,
            ste_error: sat_i16(status.ste_error),
            seb_error: sat_i16(status.seb_error),
            pitch_cdeg: rad_to_cdeg(status.pitch_setpoint),
            throttle: unit_to_u8(status.throttle_setpoint),
            undersped: unit_to_u8(status.percent_undersped),
            mode: status.mode as u8,
        }
    }
}

/// Compressed delta frame (11 bytes) for subsequent samples.
/// Slow-moving fields are delta-encoded at reduced resolution; pitch,
/// throttle and mode move fast and stay absolute.
#[repr(C, packed)]
#[derive(zerocopy::IntoBytes, zerocopy::Immutable, Clone, Copy, Debug)]
pub struct StatusDelta {
    pub d_time_ms: u8,    // Delta time (ms)
    pub d_hgt_sp_m: i8,   // Delta height setpoint (m) - lower res than keyframe
    pub d_hgt_rate: i8,   // Delta height-rate setpoint (dm/s)
    pub d_tas: i8,        // Delta TAS (dm/s)
    pub d_ste_error: i8,  // Delta total energy error (m²/s²)
    pub d_seb_error: i8,  // Delta balance energy error (m²/s²)
    pub pitch_cdeg: i16,  // Absolute pitch - changes too fast to delta encode
    pub throttle: u8,     // Absolute throttle
    pub undersped: u8,    // Absolute underspeed ramp
    pub mode: u8,         // Absolute mode
}

// ---------------------------------------------------------------------------
// 3. Batch compressor
// ---------------------------------------------------------------------------

const FULL_FRAME_TAG: u8 = 0x00;
const DELTA_FRAME_TAG: u8 = 0x01;
const FULL_FRAME_LEN: usize = 22; // tag + 21 byte frame
const DELTA_FRAME_LEN: usize = 12; // tag + 11 byte frame

/// Packs status frames into a radio-MTU-sized buffer, delta-compressing
/// where the quantized changes fit.
pub struct StatusBatcher {
    buffer: [u8; 250], // Max LoRa MTU
    offset: usize,
    last_frame: Option<StatusFrame>,
}

impl Default for StatusBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBatcher {
    pub fn new() -> Self {
        Self {
            buffer: [0u8; 250],
            offset: 0,
            last_frame: None,
        }
    }

    /// Append a sample. Returns false when the buffer is full and should be
    /// finalized and flushed.
    pub fn push(&mut self, time_ms: u32, status: &TecsStatus) -> bool {
        let current = StatusFrame::from_status(time_ms, status);

        let prev = match self.last_frame {
            Some(prev) => prev,
            None => return self.push_full(current),
        };

        let d_time = current.time_ms.wrapping_sub(prev.time_ms);
        let d_hgt = (current.hgt_sp_dm / 10) - (prev.hgt_sp_dm / 10);
        let d_rate = (current.hgt_rate_sp_cm_s as i32 - prev.hgt_rate_sp_cm_s as i32) / 10;
        let d_tas = (current.tas_cm_s as i32 - prev.tas_cm_s as i32) / 10;
        let d_ste = current.ste_error as i32 - prev.ste_error as i32;
        let d_seb = current.seb_error as i32 - prev.seb_error as i32;

        let deltas_fit = d_time <= u8::MAX as u32
            && in_i8(d_hgt)
            && in_i8(d_rate)
            && in_i8(d_tas)
            && in_i8(d_ste)
            && in_i8(d_seb);

        if !deltas_fit {
            // Step change (mode transition, setpoint jump): new keyframe.
            return self.push_full(current);
        }

        if self.offset + DELTA_FRAME_LEN > self.buffer.len() {
            return false;
        }

        self.buffer[self.offset] = DELTA_FRAME_TAG;
        self.offset += 1;

        let delta = StatusDelta {
            d_time_ms: d_time as u8,
            d_hgt_sp_m: d_hgt as i8,
            d_hgt_rate: d_rate as i8,
            d_tas: d_tas as i8,
            d_ste_error: d_ste as i8,
            d_seb_error: d_seb as i8,
            pitch_cdeg: current.pitch_cdeg, // Absolute!
            throttle: current.throttle,     // Absolute!
            undersped: current.undersped,
            mode: current.mode,
        };
        self.buffer[self.offset..self.offset + DELTA_FRAME_LEN - 1]
            .copy_from_slice(delta.as_bytes());
        self.offset += DELTA_FRAME_LEN - 1;

        self.last_frame = Some(current);
        true
    }

    fn push_full(&mut self, current: StatusFrame) -> bool {
        if self.offset + FULL_FRAME_LEN > self.buffer.len() {
            return false;
        }

        self.buffer[self.offset] = FULL_FRAME_TAG;
        self.offset += 1;

        self.buffer[self.offset..self.offset + FULL_FRAME_LEN - 1]
            .copy_from_slice(current.as_bytes());
        self.offset += FULL_FRAME_LEN - 1;

        self.last_frame = Some(current);
        true
    }

    pub fn finalize(&mut self) -> &[u8] {
        &self.buffer[0..self.offset]
    }
}

fn in_i8(val: i32) -> bool {
    (-128..=127).contains(&val)
}

/// Decode a mode discriminant from a frame.
pub fn mode_from_u8(v: u8) -> TecsMode {
    match v {
        1 => TecsMode::Climbout,
        2 => TecsMode::Underspeed,
        3 => TecsMode::BadDescent,
        _ => TecsMode::Normal,
    }
}
