use std::io::{self, prelude::*};

/// Number of doublings needed to reach at least `x`: 8 -> 3, 9 -> 4.
/// 
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Read one little-endian usize.
/// 
pub fn read_usize<R: Read>(stream: &mut R) -> io::Result<usize> {
    Ok(usize::from_le_bytes(read_bytes_array(stream)?))
}

/// Read exactly `size` bytes into a new vec.
/// 
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Read exactly `SIZE` bytes into an array.
/// 
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> io::Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Fill up the given buffer by reading bytes from a stream. A stream which
/// closes before the buffer is full yields an `UnexpectedEof` error.
///
pub fn read_bytes_into<R: Read>(stream: &mut R, buffer: &mut [u8]) -> io::Result<()> {
    let mut cursor = 0;
    while cursor < buffer.len() {
        match stream.read(&mut buffer[cursor..])? {
            0 => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed mid-message")),
            n => cursor += n,
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn ceil_log2_works() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(5), 3);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
    }

    #[test]
    fn read_usize_fails_on_short_stream() {
        let mut bytes: &[u8] = &[1, 2, 3];
        assert!(read_usize(&mut bytes).is_err());
        let mut bytes: &[u8] = &7usize.to_le_bytes();
        assert_eq!(read_usize(&mut bytes).unwrap(), 7);
    }
}
