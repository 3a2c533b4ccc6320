pub mod budget;
pub mod ensemble;
pub mod params;
pub mod problem;
pub mod split;

pub use budget::SampleBudget;
pub use ensemble::{average_outputs, Dataset, FinetuneBackend, MitraEstimator};
pub use params::MitraParams;
pub use problem::{ProblemType, Task};
pub use split::{validation_split, SplitIndices, Targets};
