//! SQL fragments shared by both backends.
//!
//! These expand to string literals so each backend can `concat!` them with
//! its own placeholder syntax.

/// Header columns of a structure row `s` joined with its resource row `r`.
macro_rules! header_columns {
    () => {
        "s.backup_id, s.publish_tag, s.version_id, s.structure_id, s.resource_id, \
         s.resource_path, s.structure_state, s.date_released, s.date_expired, \
         r.resource_type, r.resource_flags, r.date_published, r.date_created, \
         r.user_created, r.user_created_name, r.date_last_modified, \
         r.user_last_modified, r.user_last_modified_name, r.resource_size, \
         r.project_last_modified, r.sibling_count"
    };
}

/// Structure rows joined with their resource rows.
macro_rules! header_from {
    () => {
        " FROM backup_structure s \
         JOIN backup_resources r \
           ON r.resource_id = s.resource_id AND r.publish_tag = s.publish_tag"
    };
}

/// Header plus content columns, ending before the WHERE clause.
macro_rules! backup_file_select {
    () => {
        concat!(
            "SELECT ",
            header_columns!(),
            ", c.content_id, c.file_content",
            header_from!(),
            " LEFT JOIN backup_contents c \
               ON c.resource_id = s.resource_id AND c.publish_tag = s.publish_tag"
        )
    };
}

/// Header columns only, ending before the WHERE clause.
macro_rules! backup_header_select {
    () => {
        concat!("SELECT ", header_columns!(), header_from!())
    };
}

/// Restricts `s` to the newest backup of its structure/resource pair
/// (highest tag, then version, then backup id).
macro_rules! latest_backup_filter {
    () => {
        " WHERE NOT EXISTS ( \
             SELECT 1 FROM backup_structure n \
             WHERE n.structure_id = s.structure_id \
               AND n.resource_id = s.resource_id \
               AND (n.publish_tag > s.publish_tag \
                    OR (n.publish_tag = s.publish_tag AND n.version_id > s.version_id) \
                    OR (n.publish_tag = s.publish_tag AND n.version_id = s.version_id \
                        AND n.backup_id > s.backup_id)) \
         )"
    };
}

/// Deletion keys of structure rows `s`, ending before the WHERE clause.
///
/// A backup has siblings when another structure row shares its resource
/// record: a different structure pointing at the same resource, or the same
/// structure written twice under one tag. The recorded sibling count covers
/// siblings that were never backed up themselves.
macro_rules! backup_key_select {
    () => {
        "SELECT s.backup_id, s.structure_id, s.resource_id, s.version_id, s.publish_tag, \
           CASE WHEN EXISTS ( \
               SELECT 1 FROM backup_structure o \
               WHERE o.resource_id = s.resource_id \
                 AND o.backup_id <> s.backup_id \
                 AND (o.structure_id <> s.structure_id OR o.publish_tag = s.publish_tag) \
           ) OR COALESCE(r.sibling_count, 1) > 1 THEN 1 ELSE 0 END AS has_siblings \
         FROM backup_structure s \
         LEFT JOIN backup_resources r \
           ON r.resource_id = s.resource_id AND r.publish_tag = s.publish_tag"
    };
}

/// Ordering expected by the deletion planner.
macro_rules! backup_key_order {
    () => {
        " ORDER BY s.structure_id, s.publish_tag, s.version_id"
    };
}
