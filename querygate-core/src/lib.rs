pub mod affinity;
pub mod completion;
pub mod conf;
pub mod load;
pub mod logging;
pub mod registry;
pub mod routing;
pub mod state;
