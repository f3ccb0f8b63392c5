pub mod conversion;
pub mod intake;

pub use conversion::{
    quantity_from_work_units, ConversionInput, ConvertedRequest, RequestConversionWorkflow,
};
pub use intake::{EstimateRefinement, NewServiceRequest, RequestIntake};
