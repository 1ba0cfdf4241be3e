//! Motion database: per-frame bone data, clip ranges, and the normalized
//! feature matrix with its bounding-box acceleration structure.
//!
//! A database is loaded once, has its features built from a
//! [`FeatureLayout`], and is then shared read-only (usually behind an
//! `Arc`) by every instance that plays from it.
//!
//! # Example
//!
//! ```rust,ignore
//! use motion_matching::{Database, FeatureLayout};
//!
//! let mut db = Database::load("assets/database.bin")?;
//! db.build_features(&FeatureLayout::default())?;
//! println!("{} frames, {} features", db.frame_count(), db.feature_count());
//! ```

use glam::{Quat, Vec3};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::Path;

use crate::array::{Array1D, Array2D};
use crate::error::{Error, Result};
use crate::features::{FeatureGroup, FeatureLayout, TRAJECTORY_FRAME_OFFSETS};
use crate::io::{ReadArrayExt, WriteArrayExt};
use crate::pose::{Pose, forward_kinematics, forward_kinematics_velocity};

/// Frames per fine bounding box
pub const BOUND_SMALL_SIZE: usize = 16;
/// Frames per coarse bounding box
pub const BOUND_LARGE_SIZE: usize = 64;

/// Per-block min/max of every feature dimension
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBounds {
    pub small_min: Array2D<f32>,
    pub small_max: Array2D<f32>,
    pub large_min: Array2D<f32>,
    pub large_max: Array2D<f32>,
}

impl FeatureBounds {
    pub fn build(features: &Array2D<f32>) -> Self {
        let frames = features.rows();
        let nfeatures = features.cols();
        let nsmall = frames.div_ceil(BOUND_SMALL_SIZE);
        let nlarge = frames.div_ceil(BOUND_LARGE_SIZE);

        let mut bounds = Self {
            small_min: Array2D::new(nsmall, nfeatures),
            small_max: Array2D::new(nsmall, nfeatures),
            large_min: Array2D::new(nlarge, nfeatures),
            large_max: Array2D::new(nlarge, nfeatures),
        };
        bounds.small_min.set(f32::MAX);
        bounds.small_max.set(f32::MIN);
        bounds.large_min.set(f32::MAX);
        bounds.large_max.set(f32::MIN);

        for i in 0..frames {
            let i_sm = i / BOUND_SMALL_SIZE;
            let i_lr = i / BOUND_LARGE_SIZE;
            for (j, &value) in features.row(i).iter().enumerate() {
                bounds.small_min[(i_sm, j)] = bounds.small_min[(i_sm, j)].min(value);
                bounds.small_max[(i_sm, j)] = bounds.small_max[(i_sm, j)].max(value);
                bounds.large_min[(i_lr, j)] = bounds.large_min[(i_lr, j)].min(value);
                bounds.large_max[(i_lr, j)] = bounds.large_max[(i_lr, j)].max(value);
            }
        }

        bounds
    }
}

/// Motion database loaded from a `database.bin` file
#[derive(Debug, Clone, Default)]
pub struct Database {
    /// Local bone positions `[frame × bone]`
    pub bone_positions: Array2D<Vec3>,
    pub bone_velocities: Array2D<Vec3>,
    pub bone_rotations: Array2D<Quat>,
    pub bone_angular_velocities: Array2D<Vec3>,
    /// Parent of each bone, `-1` for the root
    pub bone_parents: Array1D<i32>,

    pub range_starts: Array1D<usize>,
    pub range_stops: Array1D<usize>,

    /// Foot contact flags `[frame × contact]`
    pub contact_states: Array2D<bool>,

    features: Array2D<f32>,
    feature_offset: Array1D<f32>,
    feature_scale: Array1D<f32>,
    layout: Option<FeatureLayout>,
    bounds: FeatureBounds,
}

fn ranges_from_file(values: Array1D<i32>, what: &str) -> Result<Array1D<usize>> {
    values
        .into_vec()
        .into_iter()
        .map(|v| {
            usize::try_from(v)
                .map_err(|_| Error::InvalidFormat(format!("negative range {what}: {v}")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1D::from_vec)
}

fn ranges_to_file(values: &Array1D<usize>) -> Result<Array1D<i32>> {
    values
        .iter()
        .map(|&v| {
            i32::try_from(v)
                .map_err(|_| Error::InvalidFormat(format!("range bound {v} exceeds i32 range")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1D::from_vec)
}

impl Database {
    /// Assemble a database from raw arrays, validating their shapes
    pub fn from_parts(
        bone_positions: Array2D<Vec3>,
        bone_velocities: Array2D<Vec3>,
        bone_rotations: Array2D<Quat>,
        bone_angular_velocities: Array2D<Vec3>,
        bone_parents: Array1D<i32>,
        range_starts: Array1D<usize>,
        range_stops: Array1D<usize>,
        contact_states: Array2D<bool>,
    ) -> Result<Self> {
        let db = Self {
            bone_positions,
            bone_velocities,
            bone_rotations,
            bone_angular_velocities,
            bone_parents,
            range_starts,
            range_stops,
            contact_states,
            ..Self::default()
        };
        db.validate()?;
        Ok(db)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let db = Self::read(&mut reader)?;
        info!(
            "Loaded motion database {}: {} frames, {} bones, {} ranges, {} contacts",
            path.display(),
            db.frame_count(),
            db.bone_count(),
            db.range_count(),
            db.contact_count()
        );
        Ok(db)
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let bone_positions = reader.read_array2d()?;
        let bone_velocities = reader.read_array2d()?;
        let bone_rotations = reader.read_array2d()?;
        let bone_angular_velocities = reader.read_array2d()?;
        let bone_parents = reader.read_array1d()?;
        let range_starts = ranges_from_file(reader.read_array1d()?, "start")?;
        let range_stops = ranges_from_file(reader.read_array1d()?, "stop")?;
        let contact_states = reader.read_array2d()?;

        Self::from_parts(
            bone_positions,
            bone_velocities,
            bone_rotations,
            bone_angular_velocities,
            bone_parents,
            range_starts,
            range_stops,
            contact_states,
        )
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the raw animation arrays. Features are not stored.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_array2d(&self.bone_positions)?;
        writer.write_array2d(&self.bone_velocities)?;
        writer.write_array2d(&self.bone_rotations)?;
        writer.write_array2d(&self.bone_angular_velocities)?;
        writer.write_array1d(&self.bone_parents)?;
        writer.write_array1d(&ranges_to_file(&self.range_starts)?)?;
        writer.write_array1d(&ranges_to_file(&self.range_stops)?)?;
        writer.write_array2d(&self.contact_states)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let frames = self.bone_positions.rows();
        let bones = self.bone_positions.cols();

        for (what, rows, cols) in [
            ("bone velocities", self.bone_velocities.rows(), self.bone_velocities.cols()),
            ("bone rotations", self.bone_rotations.rows(), self.bone_rotations.cols()),
            (
                "bone angular velocities",
                self.bone_angular_velocities.rows(),
                self.bone_angular_velocities.cols(),
            ),
        ] {
            if rows != frames {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: frames,
                    actual: rows,
                });
            }
            if cols != bones {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: bones,
                    actual: cols,
                });
            }
        }

        if bones == 0 {
            return Err(Error::InvalidFormat("database has no bones".into()));
        }
        if self.bone_parents.len() != bones {
            return Err(Error::DimensionMismatch {
                what: "bone parents",
                expected: bones,
                actual: self.bone_parents.len(),
            });
        }
        for (bone, &parent) in self.bone_parents.iter().enumerate() {
            let valid = if bone == 0 {
                parent == -1
            } else {
                parent >= 0 && (parent as usize) < bone
            };
            if !valid {
                return Err(Error::InvalidSkeleton(format!(
                    "bone {bone} has invalid parent {parent}"
                )));
            }
        }

        if self.range_starts.len() != self.range_stops.len() {
            return Err(Error::DimensionMismatch {
                what: "range stops",
                expected: self.range_starts.len(),
                actual: self.range_stops.len(),
            });
        }
        if self.range_starts.is_empty() {
            return Err(Error::InvalidFormat("database has no ranges".into()));
        }
        for (r, (&start, &stop)) in self
            .range_starts
            .iter()
            .zip(self.range_stops.iter())
            .enumerate()
        {
            if start >= stop || stop > frames {
                return Err(Error::InvalidFormat(format!(
                    "range {r} [{start}, {stop}) is empty or outside {frames} frames"
                )));
            }
        }

        if self.contact_states.cols() > 0 && self.contact_states.rows() != frames {
            return Err(Error::DimensionMismatch {
                what: "contact states",
                expected: frames,
                actual: self.contact_states.rows(),
            });
        }

        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.bone_positions.rows()
    }

    pub fn bone_count(&self) -> usize {
        self.bone_positions.cols()
    }

    pub fn range_count(&self) -> usize {
        self.range_starts.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_states.cols()
    }

    pub fn feature_count(&self) -> usize {
        self.features.cols()
    }

    pub fn range(&self, index: usize) -> Range<usize> {
        self.range_starts[index]..self.range_stops[index]
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.range_starts
            .iter()
            .zip(self.range_stops.iter())
            .map(|(&start, &stop)| start..stop)
    }

    /// Index of the range containing `frame`
    pub fn range_of(&self, frame: usize) -> Option<usize> {
        self.ranges().position(|range| range.contains(&frame))
    }

    /// `frame + offset` clamped to `[start, stop - margin]` of the range
    /// containing `frame`.
    ///
    /// # Panics
    ///
    /// Panics if `frame` lies outside every range.
    pub fn trajectory_index_clamp(&self, frame: usize, offset: usize, margin: usize) -> usize {
        let Some(range) = self.range_of(frame).map(|r| self.range(r)) else {
            panic!("frame {frame} is not inside any range");
        };
        (frame + offset)
            .min(range.end.saturating_sub(margin))
            .max(range.start)
    }

    pub fn features(&self) -> &Array2D<f32> {
        &self.features
    }

    pub fn feature_offset(&self) -> &Array1D<f32> {
        &self.feature_offset
    }

    pub fn feature_scale(&self) -> &Array1D<f32> {
        &self.feature_scale
    }

    pub fn layout(&self) -> Option<&FeatureLayout> {
        self.layout.as_ref()
    }

    pub fn bounds(&self) -> &FeatureBounds {
        &self.bounds
    }

    /// Copy the stored pose of `frame` into `out`
    pub fn pose(&self, frame: usize, out: &mut Pose) {
        out.positions.clear();
        out.positions.extend_from_slice(self.bone_positions.row(frame));
        out.velocities.clear();
        out.velocities.extend_from_slice(self.bone_velocities.row(frame));
        out.rotations.clear();
        out.rotations.extend_from_slice(self.bone_rotations.row(frame));
        out.angular_velocities.clear();
        out.angular_velocities
            .extend_from_slice(self.bone_angular_velocities.row(frame));
        out.contacts.clear();
        if self.contact_count() > 0 {
            out.contacts.extend_from_slice(self.contact_states.row(frame));
        }
    }

    /// Compute, normalize and bound every feature group of `layout`
    pub fn build_features(&mut self, layout: &FeatureLayout) -> Result<()> {
        for slot in layout.slots() {
            if let FeatureGroup::BonePosition(bone) | FeatureGroup::BoneVelocity(bone) = slot.group {
                if bone >= self.bone_count() {
                    return Err(Error::InvalidSkeleton(format!(
                        "feature bone {bone} is outside the {} database bones",
                        self.bone_count()
                    )));
                }
            }
        }

        let frames = self.frame_count();
        let size = layout.size();
        self.features = Array2D::new(frames, size);
        self.feature_offset = Array1D::new(size);
        self.feature_scale = Array1D::new(size);

        for slot in layout.slots() {
            match slot.group {
                FeatureGroup::BonePosition(bone) => self.compute_bone_position_feature(slot.offset, bone),
                FeatureGroup::BoneVelocity(bone) => self.compute_bone_velocity_feature(slot.offset, bone),
                FeatureGroup::TrajectoryPositions => self.compute_trajectory_position_feature(slot.offset),
                FeatureGroup::TrajectoryDirections => {
                    self.compute_trajectory_direction_feature(slot.offset);
                }
            }
            normalize_feature(
                &mut self.features,
                &mut self.feature_offset,
                &mut self.feature_scale,
                slot.offset,
                slot.group.dims(),
                slot.weight,
            );
        }

        self.bounds = FeatureBounds::build(&self.features);
        self.layout = Some(layout.clone());
        info!(
            "Built {} features over {} frames ({} fine, {} coarse bounds)",
            size,
            frames,
            self.bounds.small_min.rows(),
            self.bounds.large_min.rows()
        );
        Ok(())
    }

    /// Install a precomputed, already normalized feature matrix
    pub fn set_features(
        &mut self,
        layout: FeatureLayout,
        features: Array2D<f32>,
        offset: Array1D<f32>,
        scale: Array1D<f32>,
    ) -> Result<()> {
        if features.rows() != self.frame_count() {
            return Err(Error::DimensionMismatch {
                what: "feature rows",
                expected: self.frame_count(),
                actual: features.rows(),
            });
        }
        for (what, actual) in [
            ("feature columns", features.cols()),
            ("feature offset", offset.len()),
            ("feature scale", scale.len()),
        ] {
            if actual != layout.size() {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: layout.size(),
                    actual,
                });
            }
        }

        self.bounds = FeatureBounds::build(&features);
        self.features = features;
        self.feature_offset = offset;
        self.feature_scale = scale;
        self.layout = Some(layout);
        debug!("Installed precomputed features for {} frames", self.frame_count());
        Ok(())
    }

    pub fn normalize_query(&self, query: &[f32], out: &mut [f32]) {
        for (i, value) in out.iter_mut().enumerate() {
            *value = (query[i] - self.feature_offset[i]) / self.feature_scale[i];
        }
    }

    pub fn denormalize_features(&self, features: &[f32], out: &mut [f32]) {
        for (i, value) in out.iter_mut().enumerate() {
            *value = features[i] * self.feature_scale[i] + self.feature_offset[i];
        }
    }

    fn root_inverse(&self, frame: usize) -> (Vec3, Quat) {
        (
            self.bone_positions[(frame, 0)],
            self.bone_rotations[(frame, 0)].inverse(),
        )
    }

    fn compute_bone_position_feature(&mut self, offset: usize, bone: usize) {
        for i in 0..self.frame_count() {
            let (position, _) = forward_kinematics(
                self.bone_positions.row(i),
                self.bone_rotations.row(i),
                self.bone_parents.as_slice(),
                bone,
            );
            let (root_position, root_inverse) = self.root_inverse(i);
            let local = root_inverse * (position - root_position);
            self.write_vec3(i, offset, local);
        }
    }

    fn compute_bone_velocity_feature(&mut self, offset: usize, bone: usize) {
        for i in 0..self.frame_count() {
            let kinematics = forward_kinematics_velocity(
                self.bone_positions.row(i),
                self.bone_velocities.row(i),
                self.bone_rotations.row(i),
                self.bone_angular_velocities.row(i),
                self.bone_parents.as_slice(),
                bone,
            );
            let (_, root_inverse) = self.root_inverse(i);
            self.write_vec3(i, offset, root_inverse * kinematics.velocity);
        }
    }

    fn compute_trajectory_position_feature(&mut self, offset: usize) {
        for i in 0..self.frame_count() {
            let (root_position, root_inverse) = self.root_inverse(i);
            for (k, &frames_ahead) in TRAJECTORY_FRAME_OFFSETS.iter().enumerate() {
                let t = self.trajectory_index_clamp(i, frames_ahead, 1);
                let p = root_inverse * (self.bone_positions[(t, 0)] - root_position);
                self.features[(i, offset + 2 * k)] = p.x;
                self.features[(i, offset + 2 * k + 1)] = p.z;
            }
        }
    }

    fn compute_trajectory_direction_feature(&mut self, offset: usize) {
        for i in 0..self.frame_count() {
            let (_, root_inverse) = self.root_inverse(i);
            for (k, &frames_ahead) in TRAJECTORY_FRAME_OFFSETS.iter().enumerate() {
                let t = self.trajectory_index_clamp(i, frames_ahead, 1);
                let d = root_inverse * (self.bone_rotations[(t, 0)] * Vec3::Z);
                self.features[(i, offset + 2 * k)] = d.x;
                self.features[(i, offset + 2 * k + 1)] = d.z;
            }
        }
    }

    fn write_vec3(&mut self, frame: usize, offset: usize, value: Vec3) {
        self.features[(frame, offset)] = value.x;
        self.features[(frame, offset + 1)] = value.y;
        self.features[(frame, offset + 2)] = value.z;
    }
}

/// Normalize columns `offset..offset + size` as one group.
///
/// Every dimension is centred on its mean, then the whole group is divided
/// by the average per-dimension standard deviation over `weight`.
pub fn normalize_feature(
    features: &mut Array2D<f32>,
    feature_offset: &mut Array1D<f32>,
    feature_scale: &mut Array1D<f32>,
    offset: usize,
    size: usize,
    weight: f32,
) {
    let rows = features.rows() as f32;

    for j in 0..size {
        feature_offset[offset + j] = 0.0;
    }
    for i in 0..features.rows() {
        for j in 0..size {
            feature_offset[offset + j] += features[(i, offset + j)] / rows;
        }
    }

    let mut vars = vec![0.0f32; size];
    for i in 0..features.rows() {
        for (j, var) in vars.iter_mut().enumerate() {
            let d = features[(i, offset + j)] - feature_offset[offset + j];
            *var += d * d / rows;
        }
    }

    let mut std = 0.0f32;
    for var in &vars {
        std += var.sqrt() / size as f32;
    }

    assert!(
        std > 0.0,
        "feature group at column {offset} has zero variance"
    );

    for j in 0..size {
        feature_scale[offset + j] = std / weight;
    }

    for i in 0..features.rows() {
        for j in 0..size {
            features[(i, offset + j)] =
                (features[(i, offset + j)] - feature_offset[offset + j]) / feature_scale[offset + j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    fn two_bone_database(frames: usize) -> Database {
        let mut positions = Array2D::new(frames, 2);
        let mut rotations = Array2D::new(frames, 2);
        for i in 0..frames {
            positions[(i, 0)] = Vec3::new(0.0, 0.0, i as f32 * 0.1);
            positions[(i, 1)] = Vec3::new(0.0, 1.0, 0.0);
            rotations[(i, 0)] = Quat::IDENTITY;
            rotations[(i, 1)] = Quat::IDENTITY;
        }
        Database::from_parts(
            positions,
            Array2D::new(frames, 2),
            rotations,
            Array2D::new(frames, 2),
            Array1D::from_vec(vec![-1, 0]),
            Array1D::from_vec(vec![0]),
            Array1D::from_vec(vec![frames]),
            Array2D::new(frames, 2),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_parent_after_child() {
        let mut db = two_bone_database(4);
        db.bone_parents = Array1D::from_vec(vec![-1, 1]);
        assert!(matches!(db.validate(), Err(Error::InvalidSkeleton(_))));
    }

    #[test]
    fn test_rejects_range_outside_frames() {
        let mut db = two_bone_database(4);
        db.range_stops = Array1D::from_vec(vec![5]);
        assert!(matches!(db.validate(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_trajectory_index_clamp() {
        let db = two_bone_database(100);
        assert_eq!(db.trajectory_index_clamp(10, 20, 1), 30);
        assert_eq!(db.trajectory_index_clamp(90, 20, 1), 99);
        assert_eq!(db.trajectory_index_clamp(90, 20, 2), 98);
        assert_eq!(db.trajectory_index_clamp(99, 1, 1), 99);
    }

    #[test]
    #[should_panic(expected = "not inside any range")]
    fn test_trajectory_index_clamp_outside_range() {
        let mut db = two_bone_database(10);
        db.range_stops = Array1D::from_vec(vec![5]);
        db.trajectory_index_clamp(7, 1, 1);
    }

    #[test]
    #[should_panic(expected = "zero variance")]
    fn test_zero_variance_group_asserts() {
        let mut db = two_bone_database(32);
        // bone 1 never moves relative to the root
        let layout = FeatureLayout::new(&[(FeatureGroup::BonePosition(1), 1.0)]);
        db.build_features(&layout).unwrap();
    }

    #[test]
    fn test_feature_bone_outside_skeleton_is_rejected() {
        let mut db = two_bone_database(32);
        let layout = FeatureLayout::new(&[(FeatureGroup::BoneVelocity(40), 1.0)]);
        let result = db.build_features(&layout);
        assert!(matches!(result, Err(Error::InvalidSkeleton(_))));
        assert!(db.layout().is_none());
    }

    #[test]
    fn test_rejects_contacts_without_rows() {
        let db = two_bone_database(4);
        let result = Database::from_parts(
            db.bone_positions,
            db.bone_velocities,
            db.bone_rotations,
            db.bone_angular_velocities,
            db.bone_parents,
            db.range_starts,
            db.range_stops,
            Array2D::new(0, 2),
        );
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                what: "contact states",
                expected: 4,
                actual: 0,
            })
        ));
    }

    #[test]
    fn test_accepts_database_without_contacts() {
        let db = two_bone_database(4);
        let db = Database::from_parts(
            db.bone_positions,
            db.bone_velocities,
            db.bone_rotations,
            db.bone_angular_velocities,
            db.bone_parents,
            db.range_starts,
            db.range_stops,
            Array2D::new(0, 0),
        )
        .unwrap();
        let mut pose = Pose::new(2, 0);
        db.pose(3, &mut pose);
        assert!(pose.contacts.is_empty());
    }

    #[test]
    fn test_normalized_groups_have_mean_zero() {
        let mut db = synthetic::locomotion_database(2, 200).unwrap();
        db.build_features(&FeatureLayout::default()).unwrap();
        let features = db.features();
        for j in 0..features.cols() {
            let mean: f32 = (0..features.rows()).map(|i| features[(i, j)]).sum::<f32>()
                / features.rows() as f32;
            assert!(mean.abs() < 1e-3, "column {j} mean {mean}");
        }
    }

    #[test]
    fn test_bounds_contain_frames() {
        let mut db = synthetic::locomotion_database(3, 150).unwrap();
        db.build_features(&FeatureLayout::default()).unwrap();
        let bounds = db.bounds();
        for i in 0..db.frame_count() {
            let sm = i / BOUND_SMALL_SIZE;
            let lr = i / BOUND_LARGE_SIZE;
            for (j, &f) in db.features().row(i).iter().enumerate() {
                assert!(bounds.small_min[(sm, j)] <= f && f <= bounds.small_max[(sm, j)]);
                assert!(bounds.large_min[(lr, j)] <= bounds.small_min[(sm, j)]);
                assert!(bounds.small_max[(sm, j)] <= bounds.large_max[(lr, j)]);
            }
        }
    }
}
