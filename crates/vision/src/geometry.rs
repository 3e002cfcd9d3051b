//! Normalisation of decoder-specific position data into a canonical point list.
//!
//! Decoders report where a code sits in different ways: four named corners,
//! an OpenCV-style float array, or a loose list of points. [`normalize`]
//! turns any of them into an ordered [`Geometry`] and degrades to an empty
//! list instead of failing.

/// A point in frame pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryPoint {
    pub x: f32,
    pub y: f32,
}

impl GeometryPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Ordered boundary points of a detected code. Empty means "no usable geometry".
pub type Geometry = Vec<GeometryPoint>;

/// A single point as a decoder reports it.
#[derive(Clone, Debug, PartialEq)]
pub enum PointLike {
    /// Named `x`/`y` accessors.
    Xy { x: f32, y: f32 },
    /// A sequence expected to hold exactly two coordinates.
    Seq(Vec<f32>),
}

impl PointLike {
    /// Read the point, or `None` when it is not a finite 2D coordinate.
    pub fn read(&self) -> Option<GeometryPoint> {
        let (x, y) = match self {
            PointLike::Xy { x, y } => (*x, *y),
            PointLike::Seq(values) if values.len() == 2 => (values[0], values[1]),
            PointLike::Seq(_) => return None,
        };
        (x.is_finite() && y.is_finite()).then_some(GeometryPoint::new(x, y))
    }
}

impl From<(f32, f32)> for PointLike {
    fn from((x, y): (f32, f32)) -> Self {
        PointLike::Xy { x, y }
    }
}

/// Four named corners. A decoder may leave any of them out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CornerSet {
    pub top_left: Option<PointLike>,
    pub top_right: Option<PointLike>,
    pub bottom_right: Option<PointLike>,
    pub bottom_left: Option<PointLike>,
}

impl CornerSet {
    fn in_winding_order(&self) -> [Option<&PointLike>; 4] {
        [
            self.top_left.as_ref(),
            self.top_right.as_ref(),
            self.bottom_right.as_ref(),
            self.bottom_left.as_ref(),
        ]
    }
}

/// Position data as supplied by a decoder backend.
#[derive(Clone, Debug, PartialEq)]
pub enum RawPosition {
    Corners(CornerSet),
    /// Row-major float array, e.g. OpenCV's `[1, 4, 2]` corner tensor.
    Array { data: Vec<f32>, shape: Vec<usize> },
    Points(Vec<PointLike>),
}

/// Convert decoder position data into canonical geometry.
///
/// Shapes are probed in a fixed order and the first one that fully succeeds
/// wins: named corners (returned as top-left, top-right, bottom-right,
/// bottom-left), then an array reshapeable into rows of two, then generic
/// iteration that keeps every readable point and skips the rest.
pub fn normalize(position: Option<&RawPosition>) -> Geometry {
    let Some(position) = position else {
        return Geometry::new();
    };
    named_corners(position)
        .or_else(|| array_rows(position))
        .unwrap_or_else(|| iterate_points(position))
}

fn named_corners(position: &RawPosition) -> Option<Geometry> {
    let RawPosition::Corners(corners) = position else {
        return None;
    };
    corners
        .in_winding_order()
        .into_iter()
        .map(|corner| corner.and_then(PointLike::read))
        .collect()
}

fn array_rows(position: &RawPosition) -> Option<Geometry> {
    let RawPosition::Array { data, shape } = position else {
        return None;
    };
    let declared = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))?;
    if data.is_empty()
        || data.len() % 2 != 0
        || declared != data.len()
        || data.iter().any(|value| !value.is_finite())
    {
        return None;
    }
    Some(
        data.chunks_exact(2)
            .map(|row| GeometryPoint::new(row[0], row[1]))
            .collect(),
    )
}

fn iterate_points(position: &RawPosition) -> Geometry {
    match position {
        RawPosition::Corners(corners) => corners
            .in_winding_order()
            .into_iter()
            .flatten()
            .filter_map(PointLike::read)
            .collect(),
        RawPosition::Array { data, shape } => {
            let rows = shape.first().copied().unwrap_or(0);
            if rows == 0 || data.is_empty() || data.len() % rows != 0 {
                return Geometry::new();
            }
            data.chunks_exact(data.len() / rows)
                .filter_map(|row| PointLike::Seq(row.to_vec()).read())
                .collect()
        }
        RawPosition::Points(points) => points.iter().filter_map(PointLike::read).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy(x: f32, y: f32) -> Option<PointLike> {
        Some(PointLike::Xy { x, y })
    }

    fn pts(geometry: &Geometry) -> Vec<(f32, f32)> {
        geometry.iter().map(|p| (p.x, p.y)).collect()
    }

    #[test]
    fn absent_position_is_empty() {
        assert!(normalize(None).is_empty());
    }

    #[test]
    fn named_corners_use_fixed_winding() {
        let corners = CornerSet {
            bottom_left: xy(0.0, 10.0),
            top_right: xy(10.0, 0.0),
            top_left: xy(0.0, 0.0),
            bottom_right: Some(PointLike::Seq(vec![10.0, 10.0])),
        };
        let geometry = normalize(Some(&RawPosition::Corners(corners)));
        assert_eq!(
            pts(&geometry),
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]
        );
    }

    #[test]
    fn incomplete_corners_fall_back_to_readable_points() {
        let corners = CornerSet {
            top_left: xy(1.0, 1.0),
            top_right: Some(PointLike::Seq(vec![1.0])),
            bottom_right: None,
            bottom_left: xy(1.0, 9.0),
        };
        let geometry = normalize(Some(&RawPosition::Corners(corners)));
        assert_eq!(pts(&geometry), vec![(1.0, 1.0), (1.0, 9.0)]);
    }

    #[test]
    fn opencv_style_array_keeps_supplied_order() {
        // Non-standard order: bottom-right first.
        let data = vec![10.0, 10.0, 0.0, 0.0, 10.0, 0.0, 0.0, 10.0];
        let geometry = normalize(Some(&RawPosition::Array {
            data,
            shape: vec![1, 4, 2],
        }));
        assert_eq!(
            pts(&geometry),
            vec![(10.0, 10.0), (0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]
        );
    }

    #[test]
    fn point_list_keeps_supplied_order_and_skips_unreadable() {
        let points = vec![
            PointLike::from((5.0, 5.0)),
            PointLike::Seq(vec![1.0, 2.0, 3.0]),
            PointLike::Xy {
                x: f32::NAN,
                y: 0.0,
            },
            PointLike::Seq(vec![0.0, 1.0]),
        ];
        let geometry = normalize(Some(&RawPosition::Points(points)));
        assert_eq!(pts(&geometry), vec![(5.0, 5.0), (0.0, 1.0)]);
    }

    #[test]
    fn any_even_array_reshapes_into_pairs() {
        let geometry = normalize(Some(&RawPosition::Array {
            data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            shape: vec![2, 3],
        }));
        assert_eq!(pts(&geometry), vec![(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)]);
    }

    #[test]
    fn unreshapeable_array_is_iterated_by_rows() {
        let geometry = normalize(Some(&RawPosition::Array {
            data: vec![1.0, 2.0, 3.0],
            shape: vec![3],
        }));
        assert!(geometry.is_empty());

        let geometry = normalize(Some(&RawPosition::Array {
            data: vec![1.0, 2.0, f32::INFINITY, 4.0],
            shape: vec![2, 2],
        }));
        assert_eq!(pts(&geometry), vec![(1.0, 2.0)]);
    }

    #[test]
    fn malformed_arrays_never_panic() {
        for (data, shape) in [
            (vec![], vec![]),
            (vec![1.0, 2.0], vec![]),
            (vec![1.0, 2.0, 3.0], vec![0]),
            (vec![1.0, 2.0, 3.0], vec![2]),
            (vec![1.0, 2.0], vec![3, 2]),
            (vec![], vec![2]),
            (vec![1.0, 2.0], vec![usize::MAX, 2]),
            (vec![1.0, 2.0, 3.0, 4.0], vec![usize::MAX, usize::MAX, 4]),
        ] {
            let _ = normalize(Some(&RawPosition::Array { data, shape }));
        }
    }

    #[test]
    fn overflowing_shape_falls_back_to_rows() {
        let position = RawPosition::Array {
            data: vec![1.0, 2.0, 3.0, 4.0],
            shape: vec![usize::MAX, 2, 2],
        };
        assert!(normalize(Some(&position)).is_empty());
    }
}
