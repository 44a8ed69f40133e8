//! Entity configurations shipped with the backoffice.

mod pages;
mod permissions;
mod roles;
mod terms;
mod translations;
mod users;

pub use pages::PageCrudConfig;
pub use permissions::PermissionCrudConfig;
pub use roles::RoleCrudConfig;
pub use terms::TermCrudConfig;
pub use translations::TranslationCrudConfig;
pub use users::UserCrudConfig;

use crate::crud::descriptor::Locale;
use crate::crud::{CrudError, Registry};

/// Registry with every shipped configuration.
pub fn registry(locales: Vec<Locale>) -> Result<Registry, CrudError> {
    Registry::builder(locales)
        .register(UserCrudConfig)
        .register(RoleCrudConfig)
        .register(PermissionCrudConfig)
        .register(PageCrudConfig)
        .register(TermCrudConfig)
        .register(TranslationCrudConfig)
        .build()
}
