// SPDX-License-Identifier: MIT

pub fn base_url() -> String {
    std::env::var("JOBMESH_CLI_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}
