use mgpu_common::MgpuError;

// Exit codes, one per failure class
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_OPTION_FAIL: i32 = 1;
pub const EXIT_SETUP_FAIL: i32 = 2;
pub const EXIT_DISPATCH_FAIL: i32 = 3;

/// Exit code for an error that ended the run.
pub fn code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<MgpuError>() {
        Some(MgpuError::Config(_)) => EXIT_OPTION_FAIL,
        Some(MgpuError::Setup(_)) | Some(MgpuError::Teardown(_)) => EXIT_SETUP_FAIL,
        Some(MgpuError::Dispatch(_)) => EXIT_DISPATCH_FAIL,
        None if err.downcast_ref::<mgpu_common::ConfigError>().is_some() => EXIT_OPTION_FAIL,
        None => EXIT_SETUP_FAIL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgpu_common::{BackendError, ConfigError, DispatchError, SetupError, status};

    #[test]
    fn codes_follow_failure_class() {
        let config = anyhow::Error::from(MgpuError::Config(ConfigError::Validation("x".into())));
        assert_eq!(code_for(&config), EXIT_OPTION_FAIL);

        let setup = anyhow::Error::from(MgpuError::Setup(SetupError::NoDevices {
            reason: "none".into(),
        }));
        assert_eq!(code_for(&setup), EXIT_SETUP_FAIL);

        let dispatch = anyhow::Error::from(MgpuError::Dispatch(DispatchError::Wait {
            device: 0,
            source: BackendError::new(status::OUT_OF_RESOURCES, "wait"),
        }));
        assert_eq!(code_for(&dispatch), EXIT_DISPATCH_FAIL);
    }

    #[test]
    fn bare_config_error_is_option_failure() {
        let err = anyhow::Error::from(ConfigError::Validation("bad".into()));
        assert_eq!(code_for(&err), EXIT_OPTION_FAIL);
    }

    #[test]
    fn context_does_not_hide_the_class() {
        let err = anyhow::Error::from(MgpuError::Dispatch(DispatchError::ImageShape {
            expected: 4,
            actual: 3,
        }))
        .context("Copy run");
        assert_eq!(code_for(&err), EXIT_DISPATCH_FAIL);
    }
}
