//! Data models for the roster API.
//!
//! - `LoginRequest`, `LoginResponse`: the login endpoint contract
//! - `Student`, `StudentsResponse`: roster entries
//! - `CreateStudentRequest`, `UpdateStudentRequest`: mutation payloads
//! - `HealthResponse`: service health probe

pub mod auth;
pub mod student;

pub use auth::{LoginRequest, LoginResponse};
pub use student::{
    CreateStudentRequest, HealthResponse, Student, StudentsResponse, UpdateStudentRequest,
};
