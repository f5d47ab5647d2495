//! Dense per-pixel grids for the non-image solver state.
//!
//! Color frames and masks use `image` buffers directly; the nearest-neighbor
//! field and the cost map hold values `image` has no pixel type for, so they
//! live in a compact row-major `Grid<T>` with `stride == width`.

/// Row-major dense 2D grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

/// Nearest-neighbor field: one `[x, y]` source coordinate per pixel.
///
/// Entries are signed so that warped fields can carry out-of-bounds values
/// until they are repaired.
pub type NnfField = Grid<[i32; 2]>;

/// Patch-matching cost of each pixel's current NNF assignment.
pub type CostMap = Grid<f32>;

impl<T: Clone> Grid<T> {
    /// Create a grid filled with `value`.
    pub fn new(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }
}

impl<T> Grid<T> {
    /// Build a grid by evaluating `f(x, y)` for every cell.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> &T {
        &self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl NnfField {
    /// Field where every pixel maps onto itself.
    pub fn identity(width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |x, y| [x as i32, y as i32])
    }

    /// `true` when `p` addresses a cell of this field.
    #[inline]
    pub fn contains(&self, p: [i32; 2]) -> bool {
        p[0] >= 0 && p[1] >= 0 && (p[0] as u32) < self.width && (p[1] as u32) < self.height
    }
}
