//! Numeric status codes shared by every backend.
//!
//! Values follow the OpenCL `cl_int` error codes so a failure reported by
//! the host reference backend reads the same as one from a real driver.

pub const SUCCESS: i32 = 0;
pub const DEVICE_NOT_FOUND: i32 = -1;
pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
pub const OUT_OF_RESOURCES: i32 = -5;
pub const OUT_OF_HOST_MEMORY: i32 = -6;
pub const MEM_COPY_OVERLAP: i32 = -8;
pub const BUILD_PROGRAM_FAILURE: i32 = -11;
pub const INVALID_VALUE: i32 = -30;
pub const INVALID_DEVICE: i32 = -33;
pub const INVALID_COMMAND_QUEUE: i32 = -36;
pub const INVALID_KERNEL_NAME: i32 = -46;
pub const INVALID_KERNEL_ARGS: i32 = -52;
pub const INVALID_WORK_DIMENSION: i32 = -53;
pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
pub const INVALID_BUFFER_SIZE: i32 = -61;
pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;

/// Symbolic name for a status code, used in diagnostics.
pub fn name(status: i32) -> &'static str {
    match status {
        SUCCESS => "CL_SUCCESS",
        DEVICE_NOT_FOUND => "CL_DEVICE_NOT_FOUND",
        MEM_OBJECT_ALLOCATION_FAILURE => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
        OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
        OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
        MEM_COPY_OVERLAP => "CL_MEM_COPY_OVERLAP",
        BUILD_PROGRAM_FAILURE => "CL_BUILD_PROGRAM_FAILURE",
        INVALID_VALUE => "CL_INVALID_VALUE",
        INVALID_DEVICE => "CL_INVALID_DEVICE",
        INVALID_COMMAND_QUEUE => "CL_INVALID_COMMAND_QUEUE",
        INVALID_KERNEL_NAME => "CL_INVALID_KERNEL_NAME",
        INVALID_KERNEL_ARGS => "CL_INVALID_KERNEL_ARGS",
        INVALID_WORK_DIMENSION => "CL_INVALID_WORK_DIMENSION",
        INVALID_WORK_GROUP_SIZE => "CL_INVALID_WORK_GROUP_SIZE",
        INVALID_BUFFER_SIZE => "CL_INVALID_BUFFER_SIZE",
        INVALID_GLOBAL_WORK_SIZE => "CL_INVALID_GLOBAL_WORK_SIZE",
        _ => "CL_UNKNOWN_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_names() {
        assert_eq!(name(SUCCESS), "CL_SUCCESS");
        assert_eq!(name(MEM_OBJECT_ALLOCATION_FAILURE), "CL_MEM_OBJECT_ALLOCATION_FAILURE");
        assert_eq!(name(INVALID_KERNEL_ARGS), "CL_INVALID_KERNEL_ARGS");
    }

    #[test]
    fn unknown_code_is_reported_as_unknown() {
        assert_eq!(name(-9999), "CL_UNKNOWN_ERROR");
    }
}
