diesel::table! {
    clock_updates (id) {
        id -> Integer,
        message_id -> BigInt,
        time_value -> Text,
        date_label -> Nullable<Text>,
        current_label -> Nullable<Text>,
        description -> Text,
        content -> Text,
        image_data -> Nullable<Text>,
        is_active -> Bool,
        posted_at -> BigInt,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
