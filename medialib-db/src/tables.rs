//! The catalog's table descriptors.
//!
//! Version history:
//! 1. storage, folder, media, album
//! 2. media play statistics
//! 3. folder rebuilt: `UNIQUE(path)` widened to `UNIQUE(path, storage_id)`,
//!    `parent_folder_id` added
//! 4. `media.storage_id`, `catalog_meta`
//! 5. tags, `media.rating`, `media.is_360`

use crate::descriptor::{
    Backfill, CascadeTrigger, ColumnDescriptor as Col, ColumnOption, DefaultValue,
    MembershipJoin, TableDescriptor, ViewDescriptor,
};

const PK: &[ColumnOption] = &[ColumnOption::PrimaryKey];
const AUTO_PK: &[ColumnOption] = &[ColumnOption::PrimaryKey, ColumnOption::AutoIncrement];
const NOT_NULL: &[ColumnOption] = &[ColumnOption::NotNull];
const ZERO: &[ColumnOption] = &[
    ColumnOption::NotNull,
    ColumnOption::Default(DefaultValue::Integer(0)),
];
const ONE: &[ColumnOption] = &[
    ColumnOption::NotNull,
    ColumnOption::Default(DefaultValue::Integer(1)),
];
const UNKNOWN: &[ColumnOption] = &[ColumnOption::Default(DefaultValue::Integer(-1))];
const ZERO_REAL: &[ColumnOption] = &[ColumnOption::Default(DefaultValue::Double(0.0))];

pub const STORAGE_COLUMNS: &[Col] = &[
    Col::text("storage_id").options(PK),
    Col::text("name").options(NOT_NULL),
    Col::text("root_path").options(NOT_NULL),
    Col::text("kind").options(&[
        ColumnOption::NotNull,
        ColumnOption::Default(DefaultValue::Text("external")),
    ]),
    Col::integer("scan_status").options(ZERO),
    Col::integer("validity").options(ONE),
];

pub const STORAGE: TableDescriptor = TableDescriptor {
    name: "storage",
    since: 1,
    rebuilt_in: None,
    columns: STORAGE_COLUMNS,
    cascade: None,
    view: None,
    sharded: false,
};

pub const FOLDER_COLUMNS: &[Col] = &[
    Col::text("folder_id").options(PK),
    Col::text("path").options(NOT_NULL).unique(),
    Col::text("name").options(NOT_NULL),
    Col::text("storage_id")
        .options(NOT_NULL)
        .unique_since(3)
        .indexed("storage"),
    Col::text("parent_folder_id").since(3).indexed("parent"),
    Col::integer("modified_time").options(ZERO),
    Col::integer("validity").options(ONE),
    Col::integer("scan_status").options(ZERO),
];

pub const FOLDER: TableDescriptor = TableDescriptor {
    name: "folder",
    since: 1,
    rebuilt_in: Some(3),
    columns: FOLDER_COLUMNS,
    cascade: None,
    view: None,
    sharded: false,
};

pub const MEDIA_COLUMNS: &[Col] = &[
    Col::text("media_id").options(PK),
    Col::text("path").options(NOT_NULL).unique(),
    Col::text("file_name").options(NOT_NULL),
    Col::text("folder_id").indexed("folder"),
    Col::text("storage_id")
        .since(4)
        .indexed("storage")
        .backfill(Backfill::OwningStorage),
    Col::integer("media_type")
        .options(&[
            ColumnOption::NotNull,
            ColumnOption::Default(DefaultValue::Integer(4)),
        ])
        .indexed("type"),
    Col::text("mime_type"),
    Col::integer("size").options(ZERO),
    Col::integer("added_time").options(ZERO),
    Col::integer("modified_time").options(ZERO).indexed("modified"),
    Col::text("thumbnail_path").indexed("thumbnail"),
    Col::text("title").indexed("title"),
    Col::integer("album_id").indexed("album"),
    Col::text("album"),
    Col::text("artist").indexed("artist"),
    Col::text("album_artist"),
    Col::text("genre").indexed("genre"),
    Col::text("composer"),
    Col::text("year"),
    Col::text("recorded_date"),
    Col::text("copyright"),
    Col::text("track_num"),
    Col::text("description"),
    Col::integer("bitrate").options(UNKNOWN),
    Col::integer("bitpersample").options(UNKNOWN),
    Col::integer("samplerate").options(UNKNOWN),
    Col::integer("channels").options(UNKNOWN),
    Col::integer("duration").options(UNKNOWN),
    Col::double("longitude").options(ZERO_REAL),
    Col::double("latitude").options(ZERO_REAL),
    Col::double("altitude").options(ZERO_REAL),
    Col::text("exposure_time"),
    Col::double("fnumber").options(ZERO_REAL),
    Col::integer("iso").options(UNKNOWN),
    Col::text("model"),
    Col::integer("width").options(UNKNOWN),
    Col::integer("height").options(UNKNOWN),
    Col::text("datetaken"),
    Col::integer("orientation").options(UNKNOWN),
    Col::integer("is_drm").options(ZERO),
    Col::integer("favourite").options(ZERO),
    Col::integer("timeline").options(ZERO).indexed("timeline"),
    Col::integer("played_count").options(ZERO).since(2),
    Col::integer("last_played_time").options(ZERO).since(2),
    Col::integer("last_played_position").options(ZERO).since(2),
    Col::integer("rating").options(ZERO).since(5),
    Col::integer("is_360").options(ZERO).since(5),
    Col::integer("validity").options(ONE),
];

pub const MEDIA: TableDescriptor = TableDescriptor {
    name: "media",
    since: 1,
    rebuilt_in: None,
    columns: MEDIA_COLUMNS,
    cascade: None,
    view: None,
    sharded: true,
};

pub const ALBUM_COLUMNS: &[Col] = &[
    Col::integer("album_id").options(AUTO_PK),
    Col::text("name").options(NOT_NULL).unique(),
    Col::text("artist")
        .options(&[
            ColumnOption::NotNull,
            ColumnOption::Default(DefaultValue::Text("")),
        ])
        .unique(),
    Col::text("album_art"),
];

pub const ALBUM: TableDescriptor = TableDescriptor {
    name: "album",
    since: 1,
    rebuilt_in: None,
    columns: ALBUM_COLUMNS,
    cascade: None,
    view: None,
    sharded: false,
};

pub const CATALOG_META_COLUMNS: &[Col] = &[
    Col::text("key").options(PK).since(4),
    Col::integer("value").options(ZERO).since(4),
];

pub const CATALOG_META: TableDescriptor = TableDescriptor {
    name: "catalog_meta",
    since: 4,
    rebuilt_in: None,
    columns: CATALOG_META_COLUMNS,
    cascade: None,
    view: None,
    sharded: false,
};

pub const TAG_COLUMNS: &[Col] = &[
    Col::integer("tag_id")
        .options(AUTO_PK)
        .since(5)
        .trigger_source(),
    Col::text("name").options(NOT_NULL).unique().since(5),
];

pub const TAG: TableDescriptor = TableDescriptor {
    name: "tag",
    since: 5,
    rebuilt_in: None,
    columns: TAG_COLUMNS,
    cascade: Some(CascadeTrigger {
        event_table: "tag_map",
    }),
    view: Some(ViewDescriptor {
        name: "tag_view",
        membership: Some(MembershipJoin {
            map_table: "tag_map",
            count_column: "media_id",
            count_alias: "media_count",
        }),
    }),
    sharded: false,
};

pub const TAG_MAP_COLUMNS: &[Col] = &[
    Col::integer("map_id").options(AUTO_PK).since(5),
    Col::integer("tag_id")
        .options(NOT_NULL)
        .unique()
        .indexed("tag")
        .since(5),
    Col::text("media_id")
        .options(NOT_NULL)
        .unique()
        .indexed("media")
        .since(5),
];

pub const TAG_MAP: TableDescriptor = TableDescriptor {
    name: "tag_map",
    since: 5,
    rebuilt_in: None,
    columns: TAG_MAP_COLUMNS,
    cascade: None,
    view: None,
    sharded: false,
};

/// Registration order; owning tables before the tables that refer to them.
pub const ALL: &[TableDescriptor] = &[STORAGE, FOLDER, MEDIA, ALBUM, CATALOG_META, TAG, TAG_MAP];
