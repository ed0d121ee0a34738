// Diesel table definitions. Keep in sync with the DDL in schema.rs.

diesel::table! {
    enterprises (id) {
        id -> Integer,
        env_scope -> Text,
        name -> Text,
        unified_social_credit_code -> Nullable<Text>,
        legal_representative -> Nullable<Text>,
        feijiang_wenxin -> Nullable<Text>,
        clue_in_time -> Nullable<Text>,
        clue_update_time -> Nullable<Text>,
        partner_level -> Nullable<Text>,
        eco_ai_products -> Nullable<Text>,
        priority -> Nullable<Text>,
        base -> Nullable<Text>,
        registered_capital -> Nullable<BigInt>,
        employee_count -> Nullable<Integer>,
        enterprise_background -> Nullable<Text>,
        industry -> Nullable<Text>,
        task_direction -> Nullable<Text>,
        tech_field -> Nullable<Text>,
        contact_info -> Nullable<Text>,
        usage_scenario -> Nullable<Text>,
        longitude -> Nullable<Double>,
        latitude -> Nullable<Double>,
        adoption_depth -> Nullable<Text>,
        ernie_model_type -> Nullable<Text>,
        monthly_api_calls -> Nullable<BigInt>,
        clue_stage -> Nullable<Text>,
        clue_source -> Nullable<Text>,
        clue_source_detail -> Nullable<Text>,
        is_powered_by -> Integer,
        pb_auth_info -> Nullable<Text>,
        award_status -> Nullable<Text>,
        award_time -> Nullable<Text>,
        award_location -> Nullable<Text>,
        cert_expiry_date -> Nullable<Text>,
        cert_status -> Nullable<Text>,
        shipping_status -> Nullable<Text>,
        tracking_number -> Nullable<Text>,
        ai_implementation_stage -> Nullable<Text>,
        status -> Text,
        owner_id -> Nullable<Integer>,
        created_by -> Nullable<Text>,
        updated_by -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        password_hash -> Text,
        role -> Text,
        env_scope -> Text,
        status -> Text,
        first_name -> Nullable<Text>,
        region -> Nullable<Text>,
        department -> Nullable<Text>,
        manager_id -> Nullable<Integer>,
        last_login_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    policies (id) {
        id -> Integer,
        env_scope -> Text,
        title -> Nullable<Text>,
        source_url -> Text,
        content -> Nullable<Text>,
        summary -> Nullable<Text>,
        publish_city -> Nullable<Text>,
        publish_year -> Nullable<Integer>,
        industry_tags -> Nullable<Text>,
        mind_map_json -> Nullable<Text>,
        process_status -> Text,
        error_message -> Nullable<Text>,
        status -> Text,
        created_by -> Nullable<Integer>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    comments (id) {
        id -> Integer,
        env_scope -> Text,
        target_type -> Text,
        target_id -> Integer,
        author_id -> Integer,
        content -> Text,
        mentioned_ids -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    notifications (id) {
        id -> Integer,
        user_id -> Integer,
        notification_type -> Text,
        title -> Text,
        content -> Text,
        link -> Nullable<Text>,
        is_read -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    reports (id) {
        id -> Integer,
        env_scope -> Text,
        title -> Text,
        report_type -> Text,
        format -> Text,
        status -> Text,
        description -> Text,
        filters -> Nullable<Text>,
        file_name -> Nullable<Text>,
        file_data -> Nullable<Binary>,
        row_count -> Nullable<Integer>,
        error_message -> Nullable<Text>,
        created_by -> Nullable<Integer>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(comments -> users (author_id));
diesel::joinable!(notifications -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    enterprises,
    users,
    policies,
    comments,
    notifications,
    reports,
);
