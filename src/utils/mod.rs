pub mod dicom_time;
pub mod validation;
