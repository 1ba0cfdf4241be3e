//! Little-endian array serialization shared by the database, network and
//! latent files.
//!
//! Every array is length-prefixed: a 1-D array starts with an `i32` element
//! count, a 2-D array with `i32` rows then `i32` columns. The payload follows
//! in row-major order with no padding.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec3};
use std::io::{self, Read, Write};

use crate::array::{Array1D, Array2D};
use crate::error::{Error, Result};

/// Largest element count pre-allocated before any payload has been read.
const MAX_PREALLOCATION: usize = 1 << 16;

/// A fixed-size element that can appear inside an array payload
pub trait BinaryElement: Sized + Clone + Default {
    fn read_element<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;
    fn write_element<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;
}

impl BinaryElement for f32 {
    fn read_element<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_f32::<LittleEndian>()
    }

    fn write_element<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(*self)
    }
}

impl BinaryElement for i32 {
    fn read_element<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_i32::<LittleEndian>()
    }

    fn write_element<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(*self)
    }
}

/// Booleans occupy one byte; any non-zero value is `true`.
impl BinaryElement for bool {
    fn read_element<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(reader.read_u8()? != 0)
    }

    fn write_element<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(u8::from(*self))
    }
}

impl BinaryElement for Vec3 {
    fn read_element<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        Ok(Self::new(x, y, z))
    }

    fn write_element<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)?;
        writer.write_f32::<LittleEndian>(self.z)
    }
}

/// Quaternions are stored scalar-first: w, x, y, z.
impl BinaryElement for Quat {
    fn read_element<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let w = reader.read_f32::<LittleEndian>()?;
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        Ok(Self::from_xyzw(x, y, z, w))
    }

    fn write_element<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let [x, y, z, w] = self.to_array();
        writer.write_f32::<LittleEndian>(w)?;
        writer.write_f32::<LittleEndian>(x)?;
        writer.write_f32::<LittleEndian>(y)?;
        writer.write_f32::<LittleEndian>(z)
    }
}

fn read_count<R: Read + ?Sized>(reader: &mut R, what: &str) -> Result<usize> {
    let count = reader.read_i32::<LittleEndian>()?;
    usize::try_from(count)
        .map_err(|_| Error::InvalidFormat(format!("negative {what} count: {count}")))
}

fn write_count<W: Write + ?Sized>(writer: &mut W, count: usize, what: &str) -> Result<()> {
    let count = i32::try_from(count)
        .map_err(|_| Error::InvalidFormat(format!("{what} count {count} exceeds i32 range")))?;
    writer.write_i32::<LittleEndian>(count)?;
    Ok(())
}

fn read_elements<T: BinaryElement, R: Read + ?Sized>(
    reader: &mut R,
    count: usize,
) -> Result<Vec<T>> {
    let mut data = Vec::with_capacity(count.min(MAX_PREALLOCATION));
    for index in 0..count {
        let value = T::read_element(reader).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidFormat(format!(
                    "array payload truncated after {index} of {count} elements"
                ))
            } else {
                Error::Io(e)
            }
        })?;
        data.push(value);
    }
    Ok(data)
}

/// Extension trait for reading length-prefixed arrays
pub trait ReadArrayExt: Read {
    fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_i32::<LittleEndian>()?)
    }

    fn read_array1d<T: BinaryElement>(&mut self) -> Result<Array1D<T>> {
        let size = read_count(self, "element")?;
        Ok(Array1D::from_vec(read_elements(self, size)?))
    }

    fn read_array2d<T: BinaryElement>(&mut self) -> Result<Array2D<T>> {
        let rows = read_count(self, "row")?;
        let cols = read_count(self, "column")?;
        let total = rows.checked_mul(cols).ok_or_else(|| {
            Error::InvalidFormat(format!("array shape {rows}x{cols} overflows"))
        })?;
        Ok(Array2D::from_vec(rows, cols, read_elements(self, total)?))
    }
}

impl<R: Read + ?Sized> ReadArrayExt for R {}

/// Extension trait for writing length-prefixed arrays
pub trait WriteArrayExt: Write {
    fn write_i32_le(&mut self, value: i32) -> Result<()> {
        self.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    fn write_array1d<T: BinaryElement>(&mut self, array: &Array1D<T>) -> Result<()> {
        write_count(self, array.len(), "element")?;
        for value in array.iter() {
            value.write_element(self)?;
        }
        Ok(())
    }

    fn write_array2d<T: BinaryElement>(&mut self, array: &Array2D<T>) -> Result<()> {
        write_count(self, array.rows(), "row")?;
        write_count(self, array.cols(), "column")?;
        for value in array.as_slice() {
            value.write_element(self)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> WriteArrayExt for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_quat_is_stored_scalar_first() {
        let mut buf = Vec::new();
        Quat::from_xyzw(0.1, 0.2, 0.3, 0.9)
            .write_element(&mut buf)
            .unwrap();
        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.read_f32::<LittleEndian>().unwrap(), 0.9);
        assert_eq!(cursor.read_f32::<LittleEndian>().unwrap(), 0.1);
    }

    #[test]
    fn test_read_array2d_layout() {
        let mut buf = Vec::new();
        buf.write_i32_le(2).unwrap();
        buf.write_i32_le(2).unwrap();
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            buf.write_f32::<LittleEndian>(v).unwrap();
        }
        let array: Array2D<f32> = Cursor::new(buf).read_array2d().unwrap();
        assert_eq!(array.rows(), 2);
        assert_eq!(array[(1, 0)], 3.0);
    }

    #[test]
    fn test_bool_reads_one_byte() {
        let buf = [3u8, 0, 0, 0, 1, 0, 7];
        let array: Array1D<bool> = Cursor::new(&buf[..]).read_array1d().unwrap();
        assert_eq!(array.as_slice(), &[true, false, true]);
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mut buf = Vec::new();
        buf.write_i32_le(-4).unwrap();
        let err = Cursor::new(buf).read_array1d::<f32>().unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let mut buf = Vec::new();
        buf.write_i32_le(3).unwrap();
        buf.write_f32::<LittleEndian>(1.0).unwrap();
        let err = Cursor::new(buf).read_array1d::<f32>().unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
