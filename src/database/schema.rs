// Timestamps use `TimestamptzSqlite` so that they map onto `OffsetDateTime`.
// See https://github.com/diesel-rs/diesel/issues/3320

diesel::table! {
    institutions (id) {
        id -> Text,
        name -> Text,
        address -> Text,
        logo_url -> Text,
        filter_mode -> Text,
        suspended -> Bool,
        created_at -> TimestamptzSqlite,
    }
}

diesel::table! {
    classrooms (id) {
        id -> Text,
        institution_id -> Text,
        grade -> Text,
        section -> Text,
        capacity -> Nullable<Integer>,
        display_name -> Text,
        published -> Bool,
        created_at -> TimestamptzSqlite,
    }
}

diesel::table! {
    pending_enrollments (id) {
        id -> Text,
        institution_id -> Text,
        classroom_id -> Text,
        mac_address -> Text,
        model -> Text,
        created_at -> TimestamptzSqlite,
    }
}

diesel::table! {
    students (id) {
        id -> Text,
        institution_id -> Text,
        classroom_id -> Text,
        student_name -> Text,
        model -> Text,
        mac_address -> Text,
        device_number -> Text,
        enrolled_at -> TimestamptzSqlite,
    }
}

diesel::table! {
    activity_logs (id) {
        id -> Integer,
        student_id -> Text,
        url -> Text,
        occurred_at -> TimestamptzSqlite,
        duration_secs -> BigInt,
    }
}

diesel::table! {
    filter_configs (institution_id) {
        institution_id -> Text,
        blacklist -> Text,
        updated_at -> TimestamptzSqlite,
        updated_by -> Text,
    }
}

diesel::table! {
    messages (id) {
        id -> Text,
        institution_id -> Text,
        student_id -> Text,
        sender_id -> Text,
        body -> Text,
        sent_at -> TimestamptzSqlite,
        read_confirmation -> Bool,
    }
}

diesel::table! {
    admins (uid) {
        uid -> Text,
        institution_id -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    institutions,
    classrooms,
    pending_enrollments,
    students,
    activity_logs,
    filter_configs,
    messages,
    admins,
);
