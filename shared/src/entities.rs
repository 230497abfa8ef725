//! Screen catalog: which backend collection each admin screen shows, how it
//! is searched and filtered, and who may open it.

use serde::{Deserialize, Serialize};

use crate::access::RouteRequirement;
use crate::list_view::{FilterRule, ListConfig, Record, SearchField};

/// Records are kept as raw JSON; screens only read the fields they search,
/// filter and display.
pub type EntityRecord = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patients,
    Doctors,
    Appointments,
    MedicalRecords,
    Prescriptions,
    Invoices,
    LabTests,
    Departments,
    BedAssignments,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Patients,
        EntityKind::Doctors,
        EntityKind::Appointments,
        EntityKind::MedicalRecords,
        EntityKind::Prescriptions,
        EntityKind::Invoices,
        EntityKind::LabTests,
        EntityKind::Departments,
        EntityKind::BedAssignments,
    ];

    /// Collection path segment, also used as the route path.
    pub const fn slug(self) -> &'static str {
        match self {
            EntityKind::Patients => "patients",
            EntityKind::Doctors => "doctors",
            EntityKind::Appointments => "appointments",
            EntityKind::MedicalRecords => "medical-records",
            EntityKind::Prescriptions => "prescriptions",
            EntityKind::Invoices => "invoices",
            EntityKind::LabTests => "lab-tests",
            EntityKind::Departments => "departments",
            EntityKind::BedAssignments => "bed-assignments",
        }
    }

    /// Key wrapping a single record in create/update responses.
    pub const fn singular_key(self) -> &'static str {
        match self {
            EntityKind::Patients => "patient",
            EntityKind::Doctors => "doctor",
            EntityKind::Appointments => "appointment",
            EntityKind::MedicalRecords => "medical_record",
            EntityKind::Prescriptions => "prescription",
            EntityKind::Invoices => "invoice",
            EntityKind::LabTests => "lab_test",
            EntityKind::Departments => "department",
            EntityKind::BedAssignments => "bed_assignment",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::Patients => "Patients",
            EntityKind::Doctors => "Doctors",
            EntityKind::Appointments => "Appointments",
            EntityKind::MedicalRecords => "Medical Records",
            EntityKind::Prescriptions => "Prescriptions",
            EntityKind::Invoices => "Invoices",
            EntityKind::LabTests => "Lab Tests",
            EntityKind::Departments => "Departments",
            EntityKind::BedAssignments => "Bed Assignments",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    pub fn requirement(self) -> RouteRequirement {
        let roles: &[&str] = match self {
            EntityKind::Patients => &["admin", "doctor", "nurse", "receptionist"],
            EntityKind::Doctors => &["admin", "receptionist"],
            EntityKind::Appointments => &["admin", "doctor", "nurse", "receptionist"],
            EntityKind::MedicalRecords => &["admin", "doctor", "nurse"],
            EntityKind::Prescriptions => &["admin", "doctor", "pharmacist"],
            EntityKind::Invoices => &["admin", "accountant", "receptionist"],
            EntityKind::LabTests => &["admin", "doctor", "lab_technician"],
            EntityKind::Departments => &["admin"],
            EntityKind::BedAssignments => &["admin", "nurse"],
        };
        RouteRequirement::any_role(roles.iter().copied())
    }

    pub fn list_config(self, items_per_page: usize) -> ListConfig<EntityRecord> {
        let config = ListConfig::new(items_per_page);
        let patient_name = || SearchField::joined(["patient.first_name", "patient.last_name"]);

        match self {
            EntityKind::Patients => config
                .search(SearchField::joined(["first_name", "last_name"]))
                .search(SearchField::field("email"))
                .search(SearchField::field("phone"))
                .filter("gender", FilterRule::FieldEquals("gender".into()))
                .filter("blood_group", FilterRule::FieldEquals("blood_group".into())),

            EntityKind::Doctors => config
                .search(SearchField::joined(["first_name", "last_name"]))
                .search(SearchField::field("specialization"))
                .search(SearchField::field("email"))
                .filter("department", FilterRule::FieldEquals("department_id".into())),

            EntityKind::Appointments => config
                .search(patient_name())
                .search(SearchField::joined(["doctor.first_name", "doctor.last_name"]))
                .search(SearchField::field("reason"))
                .filter("status", FilterRule::FieldEquals("status".into()))
                .filter("date", date_prefix("appointment_date")),

            EntityKind::MedicalRecords => config
                .search(patient_name())
                .search(SearchField::field("diagnosis"))
                .search(SearchField::field("treatment"))
                .filter("doctor", FilterRule::FieldEquals("doctor_id".into())),

            EntityKind::Prescriptions => config
                .search(patient_name())
                .search(SearchField::field("medication_name"))
                .filter("status", FilterRule::FieldEquals("status".into())),

            EntityKind::Invoices => config
                .search(SearchField::field("invoice_number"))
                .search(patient_name())
                .filter("status", FilterRule::FieldEquals("payment_status".into())),

            EntityKind::LabTests => config
                .search(SearchField::field("test_name"))
                .search(patient_name())
                .filter("status", FilterRule::FieldEquals("status".into())),

            EntityKind::Departments => config
                .search(SearchField::field("name"))
                .search(SearchField::field("description")),

            EntityKind::BedAssignments => config
                .search(SearchField::field("bed_number"))
                .search(SearchField::field("ward"))
                .search(patient_name())
                .filter("ward", FilterRule::FieldEquals("ward".into()))
                .filter("occupancy", occupancy()),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Matches `YYYY-MM-DD` against a date or datetime field.
fn date_prefix(field: &'static str) -> FilterRule<EntityRecord> {
    FilterRule::custom(move |record: &EntityRecord, value: &str| {
        record
            .field_text(field)
            .is_some_and(|date| date.starts_with(value))
    })
}

/// `active` = not yet discharged, `discharged` = has a discharge date.
fn occupancy() -> FilterRule<EntityRecord> {
    FilterRule::custom(|record: &EntityRecord, value: &str| {
        let discharged = record
            .field_text("discharge_date")
            .is_some_and(|d| !d.trim().is_empty());
        match value {
            "active" => !discharged,
            "discharged" => discharged,
            _ => true,
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Route {
    Login,
    #[default]
    Dashboard,
    Entity(EntityKind),
}

impl Route {
    pub fn path(self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::Entity(kind) => format!("/{}", kind.slug()),
        }
    }

    /// Unknown paths fall back to the dashboard.
    pub fn from_path(path: &str) -> Self {
        let slug = path.trim().trim_matches('/');
        match slug {
            "login" => Route::Login,
            "" | "dashboard" => Route::Dashboard,
            other => EntityKind::from_slug(other).map_or(Route::Dashboard, Route::Entity),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Route::Login => "Sign in",
            Route::Dashboard => "Dashboard",
            Route::Entity(kind) => kind.label(),
        }
    }

    /// `None` for public routes.
    pub fn requirement(self) -> Option<RouteRequirement> {
        match self {
            Route::Login => None,
            Route::Dashboard => Some(RouteRequirement::authenticated()),
            Route::Entity(kind) => Some(kind.requirement()),
        }
    }

    /// Dashboard first, then every entity screen.
    pub fn navigation() -> impl Iterator<Item = Route> {
        std::iter::once(Route::Dashboard).chain(EntityKind::ALL.into_iter().map(Route::Entity))
    }
}
