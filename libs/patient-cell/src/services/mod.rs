pub mod patient;
pub mod quick;

pub use patient::PatientService;
pub use quick::QuickPatientProvisioner;
