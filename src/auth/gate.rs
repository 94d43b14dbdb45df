// Per-request authorization predicates over an authenticated identity

use crate::core::errors::{
    ServiceError, ServiceResult, EMAIL_VERIFICATION_REQUIRED, INSUFFICIENT_PERMISSIONS,
    KYC_VERIFICATION_REQUIRED,
};
use crate::core::models::{Role, UserSummary};

/// One access requirement; authentication itself is established by `CurrentUser`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    EmailVerified,
    KycPassed,
    RoleIn(&'static [Role]),
}

/// Roles allowed on administrative routes
pub const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::SuperAdmin];

impl Requirement {
    pub fn check(&self, user: &UserSummary) -> ServiceResult<()> {
        match self {
            Requirement::EmailVerified if !user.is_email_verified => Err(ServiceError::forbidden(
                EMAIL_VERIFICATION_REQUIRED,
                "Email verification required",
            )),
            Requirement::KycPassed if !user.is_kyc_passed => Err(ServiceError::forbidden(
                KYC_VERIFICATION_REQUIRED,
                "KYC verification required",
            )),
            Requirement::RoleIn(roles) if !roles.contains(&user.role) => Err(
                ServiceError::forbidden(INSUFFICIENT_PERMISSIONS, "Insufficient permissions"),
            ),
            _ => Ok(()),
        }
    }
}

/// Check requirements in order, stopping at the first failure
pub fn authorize(user: &UserSummary, requirements: &[Requirement]) -> ServiceResult<()> {
    requirements.iter().try_for_each(|r| r.check(user))
}
