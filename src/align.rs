/// Rounds the given size up to the next multiple of the double-word
/// granularity (16 bytes on 64-bit targets).
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(17), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::header::DSIZE - 1) & !($crate::header::DSIZE - 1)
  };
}

#[cfg(test)]
mod tests {
  use crate::header::DSIZE;

  #[test]
  fn test_align() {
    for i in 0..10 {
      let sizes = (DSIZE * i + 1)..=(DSIZE * (i + 1));

      let expected_alignment = DSIZE * (i + 1);

      for size in sizes {
        assert_eq!(expected_alignment, align!(size));
      }
    }
  }

  #[test]
  fn test_align_zero() {
    assert_eq!(align!(0usize), 0);
  }
}
