//! Binary persistence of points and saved simulations.
//!
//! A point record is a 2-byte big-endian precision tag followed by six
//! big-endian numbers: x, y, vel_x, vel_y, mass, density. The tag `'d'`
//! (`0x0064`) marks 8-byte doubles; any other tag marks 4-byte floats,
//! which older writers produced.
//!
//! A saved simulation is a 4-byte big-endian record count followed by that
//! many records. Anything after the last record is left unread, so callers
//! may append their own data.

use std::io::{self, Read, Write};

use crate::{
    engine::SimulationHandle,
    error::{Error, Result},
    point::Point,
    types::PointId,
};

/// Tag written before double-precision records.
pub const DOUBLE_TAG: u16 = b'd' as u16;

/// Tag written before single-precision records.
pub const SINGLE_TAG: u16 = b'f' as u16;

/// Numeric width of a point record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    #[default]
    Double,
    Single,
}

impl Precision {
    fn tag(self) -> u16 {
        match self {
            Precision::Double => DOUBLE_TAG,
            Precision::Single => SINGLE_TAG,
        }
    }

    fn from_tag(tag: u16) -> Self {
        if tag == DOUBLE_TAG {
            Precision::Double
        } else {
            Precision::Single
        }
    }
}

fn fields(p: &Point) -> [f64; 6] {
    [p.x(), p.y(), p.vel_x(), p.vel_y(), p.mass(), p.density()]
}

/// Writes one point in double precision.
pub fn write_point<W: Write>(w: &mut W, point: &Point) -> Result<()> {
    write_point_with(w, point, Precision::Double)
}

/// Writes one point at the given precision.
pub fn write_point_with<W: Write>(w: &mut W, point: &Point, precision: Precision) -> Result<()> {
    w.write_all(&precision.tag().to_be_bytes())?;
    for v in fields(point) {
        match precision {
            Precision::Double => w.write_all(&v.to_be_bytes())?,
            Precision::Single => w.write_all(&(v as f32).to_be_bytes())?,
        }
    }
    Ok(())
}

fn read_exact<R: Read, const N: usize>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::MalformedSnapshot("unexpected end of data".into()),
        _ => Error::Io(e),
    })?;
    Ok(buf)
}

/// Reads one point record of either precision.
///
/// ### Returns
/// - `Ok(Point)` with its radius recomputed.
/// - `Err(Error::MalformedSnapshot)` for truncated input or a record whose
///   mass or density is not strictly positive.
pub fn read_point<R: Read>(r: &mut R) -> Result<Point> {
    let precision = Precision::from_tag(u16::from_be_bytes(read_exact(r)?));
    let mut v = [0.0f64; 6];
    for slot in &mut v {
        *slot = match precision {
            Precision::Double => f64::from_be_bytes(read_exact(r)?),
            Precision::Single => f64::from(f32::from_be_bytes(read_exact(r)?)),
        };
    }
    let [x, y, vel_x, vel_y, mass, density] = v;
    Point::new(x, y, vel_x, vel_y, mass, density).map_err(|e| match e {
        Error::InvalidParameter(msg) => Error::MalformedSnapshot(msg),
        other => other,
    })
}

/// Writes a count-prefixed sequence of double-precision records.
pub fn write_state<W: Write>(w: &mut W, points: &[Point]) -> Result<()> {
    let count = u32::try_from(points.len()).map_err(|_| {
        Error::InvalidParameter(format!("{} points do not fit a snapshot", points.len()))
    })?;
    w.write_all(&count.to_be_bytes())?;
    for p in points {
        write_point(w, p)?;
    }
    Ok(())
}

/// Reads a count-prefixed sequence of records.
///
/// Nothing past the last record is consumed.
pub fn read_state<R: Read>(r: &mut R) -> Result<Vec<Point>> {
    let count = u32::from_be_bytes(read_exact(r)?) as usize;
    let mut points = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        points.push(read_point(r)?);
    }
    Ok(points)
}

impl SimulationHandle {
    /// Writes the current point set to `w`.
    pub fn save_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_state(w, &self.save_state())
    }

    /// Decodes a saved simulation from `r` and queues it as the new state.
    ///
    /// The whole input is decoded before anything is queued: on error the
    /// simulation is left untouched.
    pub fn load_from<R: Read>(&self, r: &mut R) -> Result<Vec<PointId>> {
        let points = read_state(r)?;
        Ok(self.load_state(points))
    }
}
