// Domain models: samples and the persisted report

mod report;
mod sample;

pub use report::{Datasets, DeviceSpec, Report, Spec};
pub use sample::{DeviceRecord, Sample};
