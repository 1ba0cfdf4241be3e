//! Small feed-forward network used as a learned pose decompressor.

use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::array::{Array1D, Array2D};
use crate::error::{Error, Result};
use crate::io::{ReadArrayExt, WriteArrayExt};

/// One affine layer: `y = x · kernel + bias`
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// `[input × output]`
    pub kernel: Array2D<f32>,
    pub bias: Array1D<f32>,
}

/// Layers with ReLU between them, plus input and output normalization
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralNetwork {
    pub input_mean: Array1D<f32>,
    pub input_std: Array1D<f32>,
    pub output_mean: Array1D<f32>,
    pub output_std: Array1D<f32>,
    pub layers: Vec<Layer>,
}

impl NeuralNetwork {
    pub fn new(
        input_mean: Array1D<f32>,
        input_std: Array1D<f32>,
        output_mean: Array1D<f32>,
        output_std: Array1D<f32>,
        layers: Vec<Layer>,
    ) -> Result<Self> {
        let network = Self {
            input_mean,
            input_std,
            output_mean,
            output_std,
            layers,
        };
        network.validate()?;
        Ok(network)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let network = Self::read(&mut reader)?;
        info!(
            "Loaded network {}: {} -> {} with {} layers",
            path.display(),
            network.input_size(),
            network.output_size(),
            network.layers.len()
        );
        Ok(network)
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let input_mean = reader.read_array1d()?;
        let input_std = reader.read_array1d()?;
        let output_mean = reader.read_array1d()?;
        let output_std = reader.read_array1d()?;

        let count = reader.read_i32_le()?;
        let count = usize::try_from(count)
            .map_err(|_| Error::InvalidFormat(format!("negative layer count: {count}")))?;

        let mut layers = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let kernel = reader.read_array2d()?;
            let bias = reader.read_array1d()?;
            layers.push(Layer { kernel, bias });
        }

        Self::new(input_mean, input_std, output_mean, output_std, layers)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_array1d(&self.input_mean)?;
        writer.write_array1d(&self.input_std)?;
        writer.write_array1d(&self.output_mean)?;
        writer.write_array1d(&self.output_std)?;
        let count = i32::try_from(self.layers.len())
            .map_err(|_| Error::InvalidFormat("too many layers".into()))?;
        writer.write_i32_le(count)?;
        for layer in &self.layers {
            writer.write_array2d(&layer.kernel)?;
            writer.write_array1d(&layer.bias)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let Some(first) = self.layers.first() else {
            return Err(Error::InvalidFormat("network has no layers".into()));
        };

        let mut width = first.kernel.rows();
        for (what, actual) in [
            ("input mean", self.input_mean.len()),
            ("input std", self.input_std.len()),
        ] {
            if actual != width {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: width,
                    actual,
                });
            }
        }

        for layer in &self.layers {
            if layer.kernel.rows() != width {
                return Err(Error::DimensionMismatch {
                    what: "layer input",
                    expected: width,
                    actual: layer.kernel.rows(),
                });
            }
            width = layer.kernel.cols();
            if layer.bias.len() != width {
                return Err(Error::DimensionMismatch {
                    what: "layer bias",
                    expected: width,
                    actual: layer.bias.len(),
                });
            }
        }

        for (what, actual) in [
            ("output mean", self.output_mean.len()),
            ("output std", self.output_std.len()),
        ] {
            if actual != width {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: width,
                    actual,
                });
            }
        }

        Ok(())
    }

    pub fn input_size(&self) -> usize {
        self.input_mean.len()
    }

    pub fn output_size(&self) -> usize {
        self.output_mean.len()
    }

    /// Run the network on `input`, writing the denormalized result to `output`
    pub fn evaluate(&self, input: &[f32], output: &mut Vec<f32>) {
        assert_eq!(
            input.len(),
            self.input_size(),
            "network expects {} inputs",
            self.input_size()
        );

        let mut current: Vec<f32> = input
            .iter()
            .enumerate()
            .map(|(i, &x)| (x - self.input_mean[i]) / self.input_std[i])
            .collect();
        let mut next = Vec::new();

        let last = self.layers.len() - 1;
        for (l, layer) in self.layers.iter().enumerate() {
            next.clear();
            next.extend_from_slice(layer.bias.as_slice());
            for (i, &x) in current.iter().enumerate() {
                for (j, &w) in layer.kernel.row(i).iter().enumerate() {
                    next[j] += x * w;
                }
            }
            if l != last {
                for value in &mut next {
                    *value = value.max(0.0);
                }
            }
            std::mem::swap(&mut current, &mut next);
        }

        output.clear();
        output.extend(
            current
                .iter()
                .enumerate()
                .map(|(i, &y)| y * self.output_std[i] + self.output_mean[i]),
        );
    }
}

/// Per-frame conditioning vectors `[frame × latent]`
pub fn read_latent<R: Read>(reader: &mut R) -> Result<Array2D<f32>> {
    reader.read_array2d()
}

pub fn load_latent<P: AsRef<Path>>(path: P) -> Result<Array2D<f32>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let latent = read_latent(&mut reader)?;
    info!(
        "Loaded latent table {}: {} frames x {} dims",
        path.display(),
        latent.rows(),
        latent.cols()
    );
    Ok(latent)
}

pub fn write_latent<W: Write>(writer: &mut W, latent: &Array2D<f32>) -> Result<()> {
    writer.write_array2d(latent)
}
