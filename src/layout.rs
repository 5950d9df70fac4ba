//! Strands arranged as a matrix.
//!
//! When the eight strands are folded into rows of a display, each strand
//! covers `rows_per_strand` consecutive rows of `cols` pixels. Strand 0 drives
//! the top rows, strand 7 the bottom ones. A zigzag layout runs every other
//! row of a strand right to left, which is how strips are usually laid out
//! to avoid long return wires.
//!
//! [`Canvas`] puts a [`Layout`] on top of a [`PixelStore`] so it can be drawn
//! on with `embedded-graphics`.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Size};

use crate::color::Sample;
use crate::error::InitError;
use crate::store::PixelStore;
use crate::STRAND_COUNT;

/// How the pixels of all strands map onto a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    /// Pixels per row
    pub cols: u16,
    /// Rows driven by each strand
    pub rows_per_strand: u16,
    /// Whether odd rows of a strand run right to left
    pub zigzag: bool,
}

impl Layout {
    /// A layout of `rows_per_strand` rows of `cols` pixels per strand.
    #[must_use]
    pub const fn new(cols: u16, rows_per_strand: u16, zigzag: bool) -> Self {
        Self {
            cols,
            rows_per_strand,
            zigzag,
        }
    }

    /// Pixels each strand needs.
    #[must_use]
    pub const fn strand_len(&self) -> usize {
        self.cols as usize * self.rows_per_strand as usize
    }

    /// Width of the matrix in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.cols as usize
    }

    /// Height of the matrix in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.rows_per_strand as usize * STRAND_COUNT
    }

    /// Global pixel index of `(x, y)`, or `None` off the matrix.
    #[must_use]
    pub const fn index(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let reversed = self.zigzag && (y % self.rows_per_strand as usize) % 2 == 1;
        let col = if reversed { self.width() - 1 - x } else { x };
        Some(y * self.width() + col)
    }
}

/// A [`PixelStore`] seen through a [`Layout`].
///
/// Drawing outside the matrix is silently clipped.
///
/// # Example
/// ```rust
/// use embedded_graphics::pixelcolor::Rgb888;
/// use embedded_graphics::prelude::*;
/// use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
/// use parallel_strands::color::ColorOrder;
/// use parallel_strands::layout::{Canvas, Layout};
/// use parallel_strands::store::PixelStore;
///
/// let mut store = PixelStore::<u8, 32, 3>::new(ColorOrder::GRB);
/// let mut canvas = Canvas::new(&mut store, Layout::new(16, 2, true)).unwrap();
/// assert_eq!(canvas.size(), Size::new(16, 16));
///
/// Rectangle::new(Point::new(2, 2), Size::new(4, 4))
///     .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
///     .draw(&mut canvas)
///     .unwrap();
/// ```
pub struct Canvas<'a, S, const LEN: usize, const CH: usize> {
    store: &'a mut PixelStore<S, LEN, CH>,
    layout: Layout,
}

impl<'a, S: Sample, const LEN: usize, const CH: usize> Canvas<'a, S, LEN, CH> {
    /// Lay `store` out as described by `layout`.
    ///
    /// # Errors
    /// [`InitError::LengthMismatch`] if the layout does not cover exactly
    /// `LEN` pixels per strand.
    pub fn new(store: &'a mut PixelStore<S, LEN, CH>, layout: Layout) -> Result<Self, InitError> {
        if layout.strand_len() != LEN {
            return Err(InitError::LengthMismatch {
                expected: LEN,
                actual: layout.strand_len(),
            });
        }
        Ok(Self { store, layout })
    }

    /// The layout in use.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Set the pixel at `(x, y)`; ignored off the matrix.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, color: Rgb888) {
        if let Some(n) = self.layout.index(x, y) {
            self.store.set_pixel(n, color);
        }
    }
}

impl<S: Sample, const LEN: usize, const CH: usize> OriginDimensions for Canvas<'_, S, LEN, CH> {
    fn size(&self) -> Size {
        Size::new(self.layout.width() as u32, self.layout.height() as u32)
    }
}

impl<S: Sample, const LEN: usize, const CH: usize> DrawTarget for Canvas<'_, S, LEN, CH> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for pixel in pixels {
            let (Ok(x), Ok(y)) = (usize::try_from(pixel.0.x), usize::try_from(pixel.0.y)) else {
                continue;
            };
            self.set(x, y, pixel.1);
        }
        Ok(())
    }
}

impl<S: Sample, const LEN: usize, const CH: usize> core::fmt::Debug for Canvas<'_, S, LEN, CH> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Canvas")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
