use byteorder::{ByteOrder, NetworkEndian};

use super::error::Error;
use crate::engine::{Mode, Op};

/// Width of every fixed-size field on the wire: command codes, scalars and
/// array length headers.
pub const WORD: usize = 4;

/// A request from the coordinator, or the peer's bootstrap sentinel.
///
/// Encoded as a 4-byte signed integer in network byte order.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Sum = 1,
    Max = 2,
    Sort = 3,
    SumFast = 4,
    MaxFast = 5,
    SortFast = 6,
    /// Sent once by the peer when its partition is ready. Carries no
    /// payload and expects no response.
    Ready = 99,
}

impl Command {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn encode(self) -> [u8; WORD] {
        let mut buf = [0u8; WORD];
        NetworkEndian::write_i32(&mut buf, self.code());
        buf
    }

    pub fn decode(buf: &[u8; WORD]) -> Result<Self, Error> {
        Command::try_from(NetworkEndian::read_i32(buf))
    }

    /// The request code for running `op` in `mode`.
    pub fn for_op(op: Op, mode: Mode) -> Self {
        match (op, mode) {
            (Op::Sum, Mode::Basic) => Command::Sum,
            (Op::Max, Mode::Basic) => Command::Max,
            (Op::Sort, Mode::Basic) => Command::Sort,
            (Op::Sum, Mode::Fast) => Command::SumFast,
            (Op::Max, Mode::Fast) => Command::MaxFast,
            (Op::Sort, Mode::Fast) => Command::SortFast,
        }
    }

    /// The operation a request asks for; `None` for [`Command::Ready`].
    pub fn op_mode(self) -> Option<(Op, Mode)> {
        Some(match self {
            Command::Sum => (Op::Sum, Mode::Basic),
            Command::Max => (Op::Max, Mode::Basic),
            Command::Sort => (Op::Sort, Mode::Basic),
            Command::SumFast => (Op::Sum, Mode::Fast),
            Command::MaxFast => (Op::Max, Mode::Fast),
            Command::SortFast => (Op::Sort, Mode::Fast),
            Command::Ready => return None,
        })
    }
}

impl TryFrom<i32> for Command {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Command::Sum,
            2 => Command::Max,
            3 => Command::Sort,
            4 => Command::SumFast,
            5 => Command::MaxFast,
            6 => Command::SortFast,
            99 => Command::Ready,
            other => return Err(Error::UnknownCommand(other)),
        })
    }
}

pub fn encode_f32(value: f32) -> [u8; WORD] {
    let mut buf = [0u8; WORD];
    NetworkEndian::write_f32(&mut buf, value);
    buf
}

pub fn decode_f32(buf: &[u8; WORD]) -> f32 {
    NetworkEndian::read_f32(buf)
}

/// Encodes an array header. Lengths that do not fit the 4-byte signed
/// field are rejected.
pub fn encode_len(len: usize) -> Result<[u8; WORD], Error> {
    let len = i32::try_from(len).map_err(|_| Error::LengthOverflow(len))?;
    if len <= 0 {
        return Err(Error::InvalidLength(len));
    }
    let mut buf = [0u8; WORD];
    NetworkEndian::write_i32(&mut buf, len);
    Ok(buf)
}

/// Decodes an array header; a declared length of zero or less is a protocol
/// error.
pub fn decode_len(buf: &[u8; WORD]) -> Result<usize, Error> {
    match NetworkEndian::read_i32(buf) {
        len if len > 0 => Ok(len as usize),
        len => Err(Error::InvalidLength(len)),
    }
}
