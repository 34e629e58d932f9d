/// Repeat the input along one or more axes.
///
/// `dims[i]` is an axis of the input and `multiples[i]` is the number of
/// times it is repeated.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub dims: Vec<i32>,
    pub multiples: Vec<i32>,
}

impl Tile {
    /// Tile a single axis.
    pub fn with_axis(axis: i32, multiple: i32) -> Tile {
        Tile {
            dims: vec![axis],
            multiples: vec![multiple],
        }
    }
}

impl Default for Tile {
    /// Tile axis 1 once, which leaves the input unchanged.
    fn default() -> Tile {
        Tile::with_axis(1, 1)
    }
}

/// Split the input along `axis` into `num` outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Unstack {
    pub axis: i32,
    pub num: i32,
}
