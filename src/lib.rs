pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod application;
    pub mod booking;
    pub mod caller;
    pub mod outcome;
    pub mod page;
    pub mod study_session;
    pub mod user;
}

pub mod repositories {
    pub mod application;
    pub mod booking;
    pub mod memory;
    pub mod postgres;
    pub mod session;
    pub mod store;
    pub mod user;
}

pub mod services {
    pub mod access;
    pub mod applications;
    pub mod bookings;
    pub mod payments;
    pub mod sessions;
    pub mod users;
}

pub mod handlers {
    pub mod applications;
    pub mod auth;
    pub mod bookings;
    pub mod extract;
    pub mod payments;
    pub mod response;
    pub mod sessions;
    pub mod users;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod policy;
    pub mod rate_limit;
}

pub mod validation {
    pub mod params;
}
