use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    ops::{Add, Div, Mul, Sub},
};

pub trait Calc:
    Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Sized
    + PartialOrd
    + From<u8>
    + Clone
    + Copy
{
    #[must_use]
    fn one() -> Self {
        Self::from(1)
    }
    #[must_use]
    fn zero() -> Self {
        Self::from(0)
    }
}
impl<T> Calc for T where
    T: Add<Output = Self>
        + Sub<Output = Self>
        + Mul<Output = Self>
        + Div<Output = Self>
        + Sized
        + PartialOrd
        + From<u8>
        + Clone
        + Copy
{
}

const FLOAT_TOLERANCE: TPtF = 1e-10;

fn floats_close(x: TPtF, y: TPtF) -> bool {
    (x - y).abs() < FLOAT_TOLERANCE
}

pub fn min_from_partial<T>(x1: &T, x2: &T) -> Ordering
where
    T: PartialOrd,
{
    match x1.partial_cmp(x2) {
        Some(o) => o,
        None => Ordering::Less,
    }
}
pub fn max_from_partial<T>(x1: &T, x2: &T) -> Ordering
where
    T: PartialOrd,
{
    match x1.partial_cmp(x2) {
        Some(o) => o,
        None => Ordering::Greater,
    }
}

pub fn min<T>(x1: T, x2: T) -> T
where
    T: PartialOrd,
{
    match min_from_partial(&x1, &x2) {
        Ordering::Greater => x2,
        _ => x1,
    }
}
pub fn max<T>(x1: T, x2: T) -> T
where
    T: PartialOrd,
{
    match max_from_partial(&x1, &x2) {
        Ordering::Less => x2,
        _ => x1,
    }
}

pub type ShapeI = Shape<u32>;

/// Width and height of an image slice in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Shape<T> {
    pub w: T,
    pub h: T,
}
impl<T> Shape<T>
where
    T: Calc,
{
    pub fn new(w: T, h: T) -> Self {
        Self { w, h }
    }
}
impl<T> From<(T, T)> for Shape<T>
where
    T: Calc,
{
    fn from(value: (T, T)) -> Self {
        Self {
            w: value.0,
            h: value.1,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

impl<T> Point<T>
where
    T: Calc,
{
    pub fn len_square(&self) -> T {
        self.x * self.x + self.y * self.y
    }
    pub fn dot(&self, rhs: &Self) -> T {
        self.x * rhs.x + self.y * rhs.y
    }
}

impl<T> Mul<T> for Point<T>
where
    T: Calc,
{
    type Output = Self;
    fn mul(self, rhs: T) -> Self::Output {
        Point {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}
impl<T> Div<T> for Point<T>
where
    T: Calc,
{
    type Output = Self;
    fn div(self, rhs: T) -> Self::Output {
        Point {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}
impl<T> Sub for Point<T>
where
    T: Calc,
{
    type Output = Point<T>;
    fn sub(self, rhs: Self) -> Self::Output {
        Point {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}
impl<T> Add for Point<T>
where
    T: Calc,
{
    type Output = Point<T>;
    fn add(self, rhs: Self) -> Self::Output {
        Point {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl<T> From<(T, T)> for Point<T>
where
    T: Calc,
{
    fn from(value: (T, T)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}
impl<T> From<Point<T>> for (T, T)
where
    T: Calc,
{
    fn from(p: Point<T>) -> (T, T) {
        (p.x, p.y)
    }
}

pub type TPtF = f64;
pub type TPtI = u32;
pub type PtF = Point<TPtF>;
pub type PtI = Point<TPtI>;

impl PtF {
    /// Euclidean distance, the `length` metric of a measurement.
    #[must_use]
    pub fn dist(&self, other: &Self) -> TPtF {
        (*other - *self).len_square().sqrt()
    }
    #[must_use]
    pub fn round(&self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
        }
    }
    #[must_use]
    pub fn round_signed(&self) -> Point<i32> {
        Point {
            x: self.x.round() as i32,
            y: self.y.round() as i32,
        }
    }
    #[must_use]
    pub fn is_close_to(&self, other: Self) -> bool {
        floats_close(self.x, other.x) && floats_close(self.y, other.y)
    }
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<PtI> for PtF {
    fn from(p: PtI) -> Self {
        (f64::from(p.x), f64::from(p.y)).into()
    }
}
impl From<(i32, i32)> for PtF {
    fn from((x, y): (i32, i32)) -> Self {
        Self {
            x: f64::from(x),
            y: f64::from(y),
        }
    }
}

#[test]
fn test_point_ops() {
    let p1: PtF = (0, 0).into();
    let p2: PtF = (3, 4).into();
    assert!((p1.dist(&p2) - 5.0).abs() < 1e-12);
    assert_eq!(p2 - p1, p2);
    assert_eq!((p1 + p2) / 2.0, PtF { x: 1.5, y: 2.0 });
    assert_eq!(p2 * 2.0, PtF { x: 6.0, y: 8.0 });
    assert_eq!(p2.dot(&p2), 25.0);
    assert!(PtF { x: 1.4, y: -2.6 }.round().is_close_to((1, -3).into()));
    assert_eq!(PtF { x: 1.4, y: -2.6 }.round_signed(), Point { x: 1, y: -3 });
    assert!(!PtF { x: f64::NAN, y: 0.0 }.is_finite());
    assert_eq!(min(2.0, f64::NAN), 2.0);
    assert_eq!(max(1, 3), 3);
}
