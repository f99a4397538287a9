//! Cell-level editing engine for paginated tables.
//!
//! Edits go through a single-cell session, are tracked against the value
//! each cell had before it was first touched, and reach the data service in
//! optimistic batches that roll back on failure.

pub mod config;
pub mod error;
pub mod format;
pub mod logging;

pub mod domain {
    pub mod entities {
        pub mod cell;
        pub mod column;
        pub mod dataset;
        pub mod edit;
    }

    pub mod baseline;
    pub mod cache;
    pub mod session;
    pub mod validation;
}

pub mod usecase {
    pub mod ports {
        pub mod data_service;
        pub mod notify;
    }

    pub mod services {
        pub mod batch_save;
        pub mod import_service;
        pub mod page_loader;
        pub mod table_editor;
    }
}

pub mod infra {
    pub mod memory;

    pub mod import {
        pub mod csv;
    }

    pub mod sqlite {
        pub mod queries;
        pub mod schema;
        pub mod service;
    }
}
