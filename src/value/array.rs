use crate::error::{ErrorKind, TemplateError};
use std::fmt;

/// Highest dimensionality an array view supports
pub const MAX_DIMENSIONS: usize = 4;

/// How many indices an array access must supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// Exactly one index per declared dimension
    #[default]
    Full,
    /// One index up to one per dimension; fewer indices collapse onto the
    /// leading dimensions
    Reduced,
}

/// Which bracket of `a[i][j]` addresses dimension 0.
///
/// Older callers index row-major buffers declared with their dimensions in
/// the opposite nesting order and need `Reversed`. The default follows the
/// declaration, so `[[1, 2, 3], [4, 5, 6]]` gives `a[1][0] == 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexOrder {
    /// `a[i][j]` addresses dimension 0 with `i`
    #[default]
    Declared,
    /// `a[i][j]` addresses dimension 0 with `j`
    Reversed,
}

/// Single array element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl Scalar {
    pub fn element_type(&self) -> ElementType {
        match self {
            Scalar::Bool(_) => ElementType::Bool,
            Scalar::Int(_) => ElementType::Int,
            Scalar::Float(_) => ElementType::Float,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Bool,
    Int,
    Float,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::Int => "int",
            ElementType::Float => "float",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed backing storage of an array view
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Elements<'a> {
    Bool(&'a [bool]),
    Int(&'a [i32]),
    Float(&'a [f32]),
}

impl<'a> Elements<'a> {
    pub fn len(&self) -> usize {
        match self {
            Elements::Bool(s) => s.len(),
            Elements::Int(s) => s.len(),
            Elements::Float(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Elements::Bool(_) => ElementType::Bool,
            Elements::Int(_) => ElementType::Int,
            Elements::Float(_) => ElementType::Float,
        }
    }

    fn get(&self, offset: usize) -> Option<Scalar> {
        match self {
            Elements::Bool(s) => s.get(offset).copied().map(Scalar::Bool),
            Elements::Int(s) => s.get(offset).copied().map(Scalar::Int),
            Elements::Float(s) => s.get(offset).copied().map(Scalar::Float),
        }
    }
}

/// Non-owning, row-major view over caller storage with 1 to 4 dimensions.
///
/// The view never copies the buffer; the borrow keeps the storage alive for
/// as long as any symbol table holds the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayView<'a> {
    elements: Elements<'a>,
    dims: [usize; MAX_DIMENSIONS],
    rank: usize,
}

impl<'a> ArrayView<'a> {
    /// Create a view, checking the dimension count and that the storage
    /// covers every addressable element
    pub fn new(elements: Elements<'a>, dimensions: &[usize]) -> Result<Self, TemplateError> {
        if dimensions.is_empty() || dimensions.len() > MAX_DIMENSIONS {
            return Err(TemplateError::bare(
                ErrorKind::InvalidArray,
                format!(
                    "Arrays need between 1 and {} dimensions, got {}.",
                    MAX_DIMENSIONS,
                    dimensions.len()
                ),
            ));
        }

        let required = dimensions
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                TemplateError::bare(ErrorKind::InvalidArray, "Array dimensions overflow the address space.")
            })?;
        if required > elements.len() {
            return Err(TemplateError::bare(
                ErrorKind::InvalidArray,
                format!(
                    "Dimensions {:?} need {} elements but the buffer holds {}.",
                    dimensions,
                    required,
                    elements.len()
                ),
            ));
        }

        let mut dims = [0; MAX_DIMENSIONS];
        dims[..dimensions.len()].copy_from_slice(dimensions);
        Ok(Self { elements, dims, rank: dimensions.len() })
    }

    pub fn ints(data: &'a [i32], dimensions: &[usize]) -> Result<Self, TemplateError> {
        Self::new(Elements::Int(data), dimensions)
    }

    pub fn floats(data: &'a [f32], dimensions: &[usize]) -> Result<Self, TemplateError> {
        Self::new(Elements::Float(data), dimensions)
    }

    pub fn bools(data: &'a [bool], dimensions: &[usize]) -> Result<Self, TemplateError> {
        Self::new(Elements::Bool(data), dimensions)
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dims[..self.rank]
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn element_type(&self) -> ElementType {
        self.elements.element_type()
    }

    pub fn elements(&self) -> Elements<'a> {
        self.elements
    }

    /// Flat offset of an index tuple.
    ///
    /// Axis `a` of a `k`-index access has stride `dims[a+1] * ... * dims[k-1]`,
    /// so a full tuple is plain row-major and a shorter tuple in
    /// [`IndexMode::Reduced`] collapses onto the leading dimensions.
    pub fn locate(&self, indices: &[usize], mode: IndexMode, bounds_check: bool) -> Result<usize, TemplateError> {
        let count = indices.len();
        let accepted = match mode {
            IndexMode::Full => count == self.rank,
            IndexMode::Reduced => count >= 1 && count <= self.rank,
        };
        if !accepted {
            let expected = match mode {
                IndexMode::Full => format!("exactly {}", self.rank),
                IndexMode::Reduced => format!("between 1 and {}", self.rank),
            };
            return Err(TemplateError::bare(
                ErrorKind::WrongIndexCount,
                format!(
                    "A {}-dimensional array takes {} indices, got {}.",
                    self.rank, expected, count
                ),
            ));
        }

        let overflow = || TemplateError::bare(ErrorKind::IndexOutOfBounds, "Array index overflows the address space.");
        let mut offset = 0usize;
        for (axis, &index) in indices.iter().enumerate() {
            if bounds_check && index >= self.dims[axis] {
                return Err(TemplateError::bare(
                    ErrorKind::IndexOutOfBounds,
                    format!(
                        "Index {} is out of bounds for dimension {} of size {}.",
                        index, axis, self.dims[axis]
                    ),
                ));
            }
            let stride = self.dims[axis + 1..count]
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .ok_or_else(overflow)?;
            offset = index
                .checked_mul(stride)
                .and_then(|step| offset.checked_add(step))
                .ok_or_else(overflow)?;
        }
        Ok(offset)
    }

    /// Element at an index tuple
    pub fn get(&self, indices: &[usize], mode: IndexMode, bounds_check: bool) -> Result<Scalar, TemplateError> {
        let offset = self.locate(indices, mode, bounds_check)?;
        self.get_flat(offset)
    }

    /// Element at a flat offset; the backing slice is always checked
    pub fn get_flat(&self, offset: usize) -> Result<Scalar, TemplateError> {
        self.elements.get(offset).ok_or_else(|| {
            TemplateError::bare(
                ErrorKind::IndexOutOfBounds,
                format!(
                    "Offset {} is past the end of a buffer of {} elements.",
                    offset,
                    self.elements.len()
                ),
            )
        })
    }

    /// Elements along the first dimension, `0..dims[0]`
    pub fn first_axis(&self) -> impl Iterator<Item = Scalar> + use<'a> {
        let elements = self.elements;
        (0..self.dims[0]).filter_map(move |i| elements.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: [i32; 6] = [1, 2, 3, 4, 5, 6];

    #[test]
    fn test_row_major_full() {
        let view = ArrayView::ints(&GRID, &[2, 3]).unwrap();
        assert_eq!(view.get(&[1, 0], IndexMode::Full, true).unwrap(), Scalar::Int(4));
        assert_eq!(view.get(&[0, 2], IndexMode::Full, true).unwrap(), Scalar::Int(3));
        assert_eq!(view.get(&[1, 2], IndexMode::Full, true).unwrap(), Scalar::Int(6));
    }

    #[test]
    fn test_three_and_four_dimensions() {
        let data: Vec<i32> = (0..24).collect();
        let cube = ArrayView::ints(&data, &[2, 3, 4]).unwrap();
        assert_eq!(cube.locate(&[1, 2, 3], IndexMode::Full, true).unwrap(), 12 + 8 + 3);

        let cube4 = ArrayView::ints(&data, &[2, 2, 3, 2]).unwrap();
        assert_eq!(cube4.locate(&[1, 1, 2, 1], IndexMode::Full, true).unwrap(), 12 + 6 + 4 + 1);
    }

    #[test]
    fn test_full_mode_requires_every_index() {
        let view = ArrayView::ints(&GRID, &[2, 3]).unwrap();
        let err = view.get(&[1], IndexMode::Full, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongIndexCount);
        let err = view.get(&[0, 0, 0], IndexMode::Full, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongIndexCount);
    }

    #[test]
    fn test_reduced_mode_collapses_leading_dimensions() {
        let data: Vec<i32> = (0..24).collect();
        let cube = ArrayView::ints(&data, &[2, 3, 4]).unwrap();
        // one index: plain offset
        assert_eq!(cube.locate(&[1], IndexMode::Reduced, true).unwrap(), 1);
        // two indices: i0 * d1 + i1
        assert_eq!(cube.locate(&[1, 2], IndexMode::Reduced, true).unwrap(), 5);
        assert_eq!(cube.locate(&[1, 2, 3], IndexMode::Reduced, true).unwrap(), 23);
        assert!(cube.locate(&[], IndexMode::Reduced, true).is_err());
    }

    #[test]
    fn test_bounds_check() {
        let view = ArrayView::ints(&GRID, &[2, 3]).unwrap();
        let err = view.get(&[0, 3], IndexMode::Full, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfBounds);
        assert!(err.is_runtime());
    }

    #[test]
    fn test_unchecked_access_still_stays_in_buffer() {
        let view = ArrayView::ints(&GRID, &[2, 3]).unwrap();
        // [0][3] aliases [1][0] when dimensions are not validated
        assert_eq!(view.get(&[0, 3], IndexMode::Full, false).unwrap(), Scalar::Int(4));
        let err = view.get(&[5, 0], IndexMode::Full, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_invalid_shapes() {
        assert_eq!(ArrayView::ints(&GRID, &[]).unwrap_err().kind, ErrorKind::InvalidArray);
        assert_eq!(ArrayView::ints(&GRID, &[1, 1, 1, 1, 1]).unwrap_err().kind, ErrorKind::InvalidArray);
        assert_eq!(ArrayView::ints(&GRID, &[3, 3]).unwrap_err().kind, ErrorKind::InvalidArray);
    }

    #[test]
    fn test_first_axis() {
        let view = ArrayView::ints(&GRID, &[2, 3]).unwrap();
        let items: Vec<Scalar> = view.first_axis().collect();
        assert_eq!(items, vec![Scalar::Int(1), Scalar::Int(2)]);

        let flags = [true, false, true];
        let view = ArrayView::bools(&flags, &[3]).unwrap();
        assert_eq!(view.element_type(), ElementType::Bool);
        assert_eq!(view.first_axis().count(), 3);
    }
}
