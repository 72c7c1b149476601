//! Conceptual-model building blocks advanced one forcing step at a time:
//! reservoirs solved with implicit Euler, unit-hydrograph lags and flux
//! routing, assembled into ExpHydro and GR4J units.

mod implicit_euler;
mod lag;
mod root_finder;
mod stores;
mod structure;
mod units;

pub use implicit_euler::ImplicitEuler;
pub use lag::UnitHydrograph;
pub use root_finder::{Pegasus, RootFinder};
pub use stores::{
    ProductionFluxes, ProductionSeries, ProductionStore, RoutingSeries, RoutingStore, SnowSeries,
    SnowStore, SoilSeries, SoilStore,
};
pub use structure::{aggregate, interception, split};
pub use units::{ExpHydroInternals, ExpHydroUnit, Gr4jInternals, Gr4jParameters, Gr4jUnit};
