use glam::IVec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned pixel box represented by minimum and maximum corners.
///
/// Coordinates live in source image pixel space with the origin at the top-left
/// corner. `min` is inclusive and `max` is exclusive when the box is painted.
/// Raw boxes coming from detectors or OCR may be negative or exceed the image;
/// use [`Bbox::clip`] before treating one as a region of the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bbox {
    /// Top-left corner `(x1, y1)`.
    pub min: IVec2,
    /// Bottom-right corner `(x2, y2)`.
    pub max: IVec2,
}

impl Bbox {
    /// Creates a new bounding box from minimum and maximum points.
    ///
    /// # Example
    /// ```
    /// use glam::IVec2;
    /// use redact_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::new(IVec2::new(0, 0), IVec2::new(10, 5));
    /// assert_eq!(bbox.width(), 10);
    /// ```
    pub fn new(min: IVec2, max: IVec2) -> Self {
        Self { min, max }
    }

    /// Creates a box from `x1, y1, x2, y2` corner coordinates.
    pub fn from_xyxy(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(IVec2::new(x1, y1), IVec2::new(x2, y2))
    }

    /// Creates a box from its top-left corner and size, the layout OCR engines report.
    ///
    /// # Example
    /// ```
    /// use redact_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::from_ltwh(1, 2, 5, 3);
    /// assert_eq!(bbox.xyxy(), [1, 2, 6, 5]);
    /// ```
    pub fn from_ltwh(left: i32, top: i32, width: i32, height: i32) -> Self {
        let min = IVec2::new(left, top);
        Self::new(min, min + IVec2::new(width, height))
    }

    /// Creates a box from floating point corners, rounding outward so that the
    /// integer box always covers the float one.
    pub fn from_f32_corners(min: glam::Vec2, max: glam::Vec2) -> Self {
        Self::new(min.floor().as_ivec2(), max.ceil().as_ivec2())
    }

    pub fn xyxy(&self) -> [i32; 4] {
        [self.min.x, self.min.y, self.max.x, self.max.y]
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    /// A box is degenerate when it covers no pixel.
    pub fn is_degenerate(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }

    /// Calculates the area of the bounding box, zero for degenerate boxes.
    ///
    /// # Example
    /// ```
    /// use redact_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::from_ltwh(0, 0, 4, 3);
    /// assert_eq!(bbox.area(), 12);
    /// ```
    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            return 0;
        }
        self.width() as i64 * self.height() as i64
    }

    /// Calculates the area of intersection between this bounding box and another.
    ///
    /// # Example
    /// ```
    /// use redact_core::analysis::bbox::Bbox;
    /// let bbox1 = Bbox::from_xyxy(0, 0, 4, 4);
    /// let bbox2 = Bbox::from_xyxy(2, 2, 6, 6);
    /// assert_eq!(bbox1.intersection(&bbox2), 4);
    /// ```
    pub fn intersection(&self, other: &Self) -> i64 {
        Self::new(self.min.max(other.min), self.max.min(other.max)).area()
    }

    /// Whether the two boxes share at least one pixel.
    pub fn intersects(&self, other: &Self) -> bool {
        self.intersection(other) > 0
    }

    /// Calculates the Intersection over Union (IoU) between this bounding box and another.
    ///
    /// Returns a value in `[0.0, 1.0]`, `0.0` when the union is empty.
    pub fn iou(&self, other: &Self) -> f32 {
        let intersection_area = self.intersection(other);
        let union_area = self.area() + other.area() - intersection_area;

        if union_area > 0 {
            intersection_area as f32 / union_area as f32
        } else {
            0.0
        }
    }

    /// Creates a union bounding box that encompasses both this bounding box and another.
    ///
    /// # Example
    /// ```
    /// use redact_core::analysis::bbox::Bbox;
    /// let union = Bbox::from_xyxy(0, 0, 5, 5).union(&Bbox::from_xyxy(3, 3, 8, 8));
    /// assert_eq!(union.xyxy(), [0, 0, 8, 8]);
    /// ```
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grows the box by `pad` pixels on every side. Negative padding shrinks it.
    pub fn pad(&self, pad: i32) -> Self {
        Self {
            min: self.min - IVec2::splat(pad),
            max: self.max + IVec2::splat(pad),
        }
    }

    /// Clamps both corners into `[0, width - 1] × [0, height - 1]`.
    ///
    /// The result may be degenerate when the box lies entirely outside the
    /// image; callers check [`Bbox::is_degenerate`] before painting.
    ///
    /// # Example
    /// ```
    /// use redact_core::analysis::bbox::Bbox;
    /// let clipped = Bbox::from_xyxy(-10, -5, 1030, 40).clip(1024, 768);
    /// assert_eq!(clipped.xyxy(), [0, 0, 1023, 40]);
    /// ```
    pub fn clip(&self, width: u32, height: u32) -> Self {
        let upper = IVec2::new(width as i32 - 1, height as i32 - 1).max(IVec2::ZERO);
        Self {
            min: self.min.max(IVec2::ZERO).min(upper),
            max: self.max.max(IVec2::ZERO).min(upper),
        }
    }

    /// Checks if this bounding box completely contains another bounding box.
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_area() {
        let bbox = Bbox::from_ltwh(0, 0, 2, 3);
        assert_eq!(bbox.area(), 6);

        let square = Bbox::from_ltwh(1, 1, 5, 5);
        assert_eq!(square.area(), 25);

        // Degenerate boxes have no area
        let line = Bbox::from_xyxy(0, 0, 5, 0);
        assert_eq!(line.area(), 0);
        let inverted = Bbox::from_xyxy(5, 5, 0, 0);
        assert_eq!(inverted.area(), 0);
    }

    #[test]
    fn test_bbox_intersection() {
        let left = Bbox::from_xyxy(0, 0, 2, 2);
        let right = Bbox::from_xyxy(3, 0, 5, 2);
        assert_eq!(left.intersection(&right), 0);
        assert!(!left.intersects(&right));

        // Touching edges do not share a pixel
        let touching = Bbox::from_xyxy(2, 0, 4, 2);
        assert!(!left.intersects(&touching));

        let wide = Bbox::from_xyxy(0, 0, 6, 2);
        let tall = Bbox::from_xyxy(1, 0, 3, 4);
        assert_eq!(wide.intersection(&tall), 4);

        let neg1 = Bbox::from_xyxy(-2, -2, 1, 1);
        let neg2 = Bbox::from_xyxy(-1, -1, 2, 2);
        assert_eq!(neg1.intersection(&neg2), 4);
    }

    #[test]
    fn test_bbox_iou() {
        let a = Bbox::from_xyxy(0, 0, 2, 2);
        assert_eq!(a.iou(&a), 1.0);

        let b = Bbox::from_xyxy(1, 0, 3, 2);
        // intersection 2, union 6
        assert!((a.iou(&b) - 2.0 / 6.0).abs() < 1e-6);

        let empty = Bbox::from_xyxy(0, 0, 0, 0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn test_bbox_pad_and_clip() {
        let word = Bbox::from_xyxy(10, 10, 90, 30);
        assert_eq!(word.pad(5).xyxy(), [5, 5, 95, 35]);
        assert_eq!(word.pad(5).clip(200, 200).xyxy(), [5, 5, 95, 35]);

        let overflowing = Bbox::from_xyxy(-4, -4, 250, 120);
        let clipped = overflowing.clip(200, 100);
        assert_eq!(clipped.xyxy(), [0, 0, 199, 99]);
        assert!(!clipped.is_degenerate());

        // Entirely outside collapses to a degenerate box
        let outside = Bbox::from_xyxy(300, 300, 320, 320).clip(200, 100);
        assert!(outside.is_degenerate());
    }

    #[test]
    fn test_bbox_from_f32_rounds_outward() {
        let bbox = Bbox::from_f32_corners(glam::Vec2::new(1.4, 2.6), glam::Vec2::new(7.2, 8.0));
        assert_eq!(bbox.xyxy(), [1, 2, 8, 8]);
    }

    #[test]
    fn test_bbox_union_and_contains() {
        let a = Bbox::from_xyxy(0, 0, 5, 5);
        let b = Bbox::from_xyxy(3, 3, 8, 8);
        let union = a.union(&b);
        assert!(union.contains(&a));
        assert!(union.contains(&b));
        assert!(!a.contains(&b));
    }
}
