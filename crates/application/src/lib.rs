//! Application services and ports.

#![forbid(unsafe_code)]

mod access_controller;
mod access_ports;

pub use access_controller::AccessController;
pub use access_ports::{
    AccessAdminRepository, AccessStore, AccessTransaction, CreatePermissionInput, CreateRoleInput,
    RoleWithPermissions,
};
