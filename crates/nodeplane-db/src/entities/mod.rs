//! Database entities

pub mod client;
pub mod inbound;
pub mod node;
pub mod tls_cert;
pub mod user;

pub use client::Entity as Client;
pub use inbound::Entity as Inbound;
pub use node::Entity as Node;
pub use tls_cert::Entity as TlsCert;
pub use user::Entity as User;

pub mod prelude {
    pub use super::client::Entity as Client;
    pub use super::inbound::Entity as Inbound;
    pub use super::node::Entity as Node;
    pub use super::tls_cert::Entity as TlsCert;
    pub use super::user::Entity as User;
}
