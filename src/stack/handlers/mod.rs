pub mod generic;
pub mod node_site;
pub mod static_site;

pub use generic::GenericHandler;
pub use node_site::NodeSiteHandler;
pub use static_site::StaticSiteHandler;
