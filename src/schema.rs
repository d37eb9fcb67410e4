// Table definitions for the harvest store.
// Kept in sync by hand with `repository::migrations::SCHEMA_SQL`.

diesel::table! {
    targets (id) {
        id -> Text,
        display_name -> Text,
        base_address -> Nullable<Text>,
        region -> Nullable<Text>,
    }
}

diesel::table! {
    records (id) {
        id -> Text,
        owner_id -> Text,
        process_number -> Text,
        organization -> Text,
        status -> Text,
        closing_date -> Nullable<Text>,
        summary_text -> Text,
        modality -> Text,
        description -> Nullable<Text>,
        disclosure_window -> Nullable<Text>,
        dispute_mode -> Nullable<Text>,
        estimated_value -> Nullable<Double>,
        flags -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Nullable<Text>,
    }
}

diesel::table! {
    record_items (id) {
        id -> Integer,
        record_id -> Text,
        line_number -> Integer,
        code -> Text,
        description -> Text,
        unit -> Text,
        quantity -> Double,
        unit_value -> Double,
        total_value -> Double,
        lot_id -> Nullable<Text>,
    }
}

diesel::joinable!(record_items -> records (record_id));

diesel::allow_tables_to_appear_in_same_query!(targets, records, record_items,);
