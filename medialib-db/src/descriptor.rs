//! Typed schema descriptors and the pure functions that render DDL from them.
//!
//! A [`TableDescriptor`] lists its columns in order, each stamped with the
//! schema version that introduced it. Rendering takes a target version so the
//! same descriptor can produce today's table or the shape an older release
//! would have created.

use rusqlite::Connection;

use crate::error::Result;
use crate::sql::{quote_ident, text_literal};

// ── Columns ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Double,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Double => "DOUBLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Double(f64),
    Text(&'static str),
    /// A parenthesised expression, e.g. `strftime('%s', 'now')`.
    Expression(&'static str),
}

impl DefaultValue {
    fn sql(&self) -> String {
        match self {
            Self::Integer(i) => i.to_string(),
            Self::Double(f) => format!("{f:?}"),
            Self::Text(s) => text_literal(s),
            Self::Expression(e) => format!("({e})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnOption {
    PrimaryKey,
    /// Only meaningful on an INTEGER primary key.
    AutoIncrement,
    NotNull,
    Default(DefaultValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnFlags {
    /// Schema version from which the column joins the table's composite
    /// `UNIQUE(...)` clause; `Some(0)` means from its own introduction.
    pub unique: Option<u32>,
    /// Key column shared between an owning table and its membership map.
    pub trigger_source: bool,
    /// Projected by views built over the table.
    pub visible: bool,
}

/// How a newly added column is filled for rows that predate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backfill {
    /// The id of the storage whose shard table holds the row.
    OwningStorage,
    /// An SQL expression evaluated per row.
    Expression(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub ty: ColumnType,
    pub options: &'static [ColumnOption],
    pub since: u32,
    /// Index name suffix; rendered as `idx_<table>_<suffix>`.
    pub index: Option<&'static str>,
    pub flags: ColumnFlags,
    pub backfill: Option<Backfill>,
}

impl ColumnDescriptor {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            options: &[],
            since: 1,
            index: None,
            flags: ColumnFlags {
                unique: None,
                trigger_source: false,
                visible: true,
            },
            backfill: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub const fn double(name: &'static str) -> Self {
        Self::new(name, ColumnType::Double)
    }

    pub const fn options(self, options: &'static [ColumnOption]) -> Self {
        Self { options, ..self }
    }

    pub const fn since(self, since: u32) -> Self {
        Self { since, ..self }
    }

    pub const fn indexed(self, suffix: &'static str) -> Self {
        Self {
            index: Some(suffix),
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        self.unique_since(0)
    }

    /// Join the `UNIQUE(...)` clause only from `version` on. The table must
    /// be rebuilt at that version for existing databases to pick it up.
    pub const fn unique_since(self, version: u32) -> Self {
        Self {
            flags: ColumnFlags {
                unique: Some(version),
                ..self.flags
            },
            ..self
        }
    }

    /// Whether the column is part of the `UNIQUE(...)` clause at `version`.
    pub fn is_unique_at(&self, version: u32) -> bool {
        self.flags
            .unique
            .is_some_and(|v| v.max(self.since) <= version)
    }

    pub const fn trigger_source(self) -> Self {
        Self {
            flags: ColumnFlags {
                trigger_source: true,
                ..self.flags
            },
            ..self
        }
    }

    pub const fn hidden(self) -> Self {
        Self {
            flags: ColumnFlags {
                visible: false,
                ..self.flags
            },
            ..self
        }
    }

    pub const fn backfill(self, backfill: Backfill) -> Self {
        Self {
            backfill: Some(backfill),
            ..self
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.options.contains(&ColumnOption::PrimaryKey)
    }

    pub fn is_not_null(&self) -> bool {
        self.options.contains(&ColumnOption::NotNull)
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.options.iter().find_map(|o| match o {
            ColumnOption::Default(d) => Some(d),
            _ => None,
        })
    }

    /// Column definition as it appears inside `CREATE TABLE` or `ADD COLUMN`.
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(self.name), self.ty.sql());
        if self.is_primary_key() {
            def.push_str(" PRIMARY KEY");
            if self.options.contains(&ColumnOption::AutoIncrement) {
                def.push_str(" AUTOINCREMENT");
            }
        }
        if self.is_not_null() {
            def.push_str(" NOT NULL");
        }
        if let Some(d) = self.default_value() {
            def.push_str(" DEFAULT ");
            def.push_str(&d.sql());
        }
        def
    }
}

// ── Tables ──────────────────────────────────────────────────────────────────

/// Rows of the owning table are deleted once the last row referencing them
/// in `event_table` goes away. The key is the owning table's
/// `trigger_source` column, which must have the same name in `event_table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeTrigger {
    pub event_table: &'static str,
}

/// A left join against a membership map, adding a per-row member count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipJoin {
    pub map_table: &'static str,
    pub count_column: &'static str,
    pub count_alias: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDescriptor {
    pub name: &'static str,
    pub membership: Option<MembershipJoin>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub since: u32,
    /// Version at which the table's structure changed in a way `ADD COLUMN`
    /// cannot express. Older databases get the table rebuilt.
    pub rebuilt_in: Option<u32>,
    pub columns: &'static [ColumnDescriptor],
    pub cascade: Option<CascadeTrigger>,
    pub view: Option<ViewDescriptor>,
    /// One physical copy per storage (see `storage`).
    pub sharded: bool,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns that exist in a table created at `version`.
    pub fn columns_at(&self, version: u32) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(move |c| c.since <= version)
    }

    pub fn visible_columns_at(&self, version: u32) -> Vec<&'static str> {
        self.columns_at(version)
            .filter(|c| c.flags.visible)
            .map(|c| c.name)
            .collect()
    }

    pub fn trigger_key(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.flags.trigger_source)
    }

    /// Highest version any part of this descriptor refers to.
    pub fn max_version(&self) -> u32 {
        let cols = self.columns.iter().map(|c| c.since).max().unwrap_or(0);
        cols.max(self.since).max(self.rebuilt_in.unwrap_or(0))
    }
}

// ── Rendering ───────────────────────────────────────────────────────────────

/// One rendered DDL statement and the object it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ddl {
    pub object: String,
    pub sql: String,
}

impl Ddl {
    pub fn execute(&self, conn: &Connection) -> Result<()> {
        log::debug!("ddl {}: {}", self.object, self.sql);
        conn.execute_batch(&self.sql)?;
        Ok(())
    }
}

/// `CREATE TABLE IF NOT EXISTS` for `desc` under the physical name `table`.
pub fn create_table(desc: &TableDescriptor, table: &str, version: u32) -> Ddl {
    let mut lines: Vec<String> = desc
        .columns_at(version)
        .map(|c| format!("    {}", c.definition()))
        .collect();

    let unique: Vec<String> = desc
        .columns_at(version)
        .filter(|c| c.is_unique_at(version))
        .map(|c| quote_ident(c.name))
        .collect();
    if !unique.is_empty() {
        lines.push(format!("    UNIQUE({})", unique.join(", ")));
    }

    Ddl {
        object: table.to_string(),
        sql: format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote_ident(table),
            lines.join(",\n")
        ),
    }
}

pub fn index_name(table: &str, suffix: &str) -> String {
    format!("idx_{table}_{suffix}")
}

pub fn create_index(table: &str, column: &ColumnDescriptor) -> Option<Ddl> {
    let suffix = column.index?;
    let name = index_name(table, suffix);
    Some(Ddl {
        sql: format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&name),
            quote_ident(table),
            quote_ident(column.name)
        ),
        object: name,
    })
}

pub fn create_indexes(desc: &TableDescriptor, table: &str, version: u32) -> Vec<Ddl> {
    desc.columns_at(version)
        .filter_map(|c| create_index(table, c))
        .collect()
}

pub fn add_column(table: &str, column: &ColumnDescriptor) -> Ddl {
    Ddl {
        object: format!("{}.{}", table, column.name),
        sql: format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            column.definition()
        ),
    }
}

pub fn cascade_trigger_name(desc: &TableDescriptor) -> Option<String> {
    desc.cascade
        .map(|c| format!("cascade_{}_on_{}", desc.name, c.event_table))
}

/// Trigger deleting an owning row once its membership count reaches zero.
pub fn cascade_trigger(desc: &TableDescriptor) -> Option<Ddl> {
    let cascade = desc.cascade?;
    let key = quote_ident(desc.trigger_key()?.name);
    let event = quote_ident(cascade.event_table);
    let name = cascade_trigger_name(desc)?;
    Some(Ddl {
        sql: format!(
            "CREATE TRIGGER IF NOT EXISTS {trigger} AFTER DELETE ON {event} FOR EACH ROW \
             WHEN (SELECT COUNT(*) FROM {event} WHERE {key} = OLD.{key}) = 0 \
             BEGIN DELETE FROM {owner} WHERE {key} = OLD.{key}; END",
            trigger = quote_ident(&name),
            owner = quote_ident(desc.name),
        ),
        object: name,
    })
}

/// `CREATE VIEW` projecting the visible columns, optionally with a member count.
pub fn create_view(desc: &TableDescriptor, version: u32) -> Option<Ddl> {
    let view = desc.view?;
    let owner = quote_ident(desc.name);
    let mut projection: Vec<String> = desc
        .visible_columns_at(version)
        .into_iter()
        .map(|c| format!("{}.{}", owner, quote_ident(c)))
        .collect();

    let sql = match (view.membership, desc.trigger_key()) {
        (Some(join), Some(key)) => {
            let map = quote_ident(join.map_table);
            let key = quote_ident(key.name);
            projection.push(format!(
                "COUNT({}.{}) AS {}",
                map,
                quote_ident(join.count_column),
                quote_ident(join.count_alias)
            ));
            format!(
                "CREATE VIEW IF NOT EXISTS {} AS SELECT {} FROM {owner} \
                 LEFT JOIN {map} ON {map}.{key} = {owner}.{key} GROUP BY {owner}.{key}",
                quote_ident(view.name),
                projection.join(", "),
            )
        }
        _ => format!(
            "CREATE VIEW IF NOT EXISTS {} AS SELECT {} FROM {owner}",
            quote_ident(view.name),
            projection.join(", "),
        ),
    };
    Some(Ddl {
        object: view.name.to_string(),
        sql,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[ColumnDescriptor] = &[
        ColumnDescriptor::integer("group_id")
            .options(&[ColumnOption::PrimaryKey, ColumnOption::AutoIncrement])
            .trigger_source(),
        ColumnDescriptor::text("name")
            .options(&[ColumnOption::NotNull])
            .unique(),
        ColumnDescriptor::text("owner").unique().indexed("owner"),
        ColumnDescriptor::integer("secret").hidden(),
        ColumnDescriptor::double("weight")
            .options(&[ColumnOption::NotNull, ColumnOption::Default(DefaultValue::Double(0.0))])
            .since(2),
    ];

    const GROUPS: TableDescriptor = TableDescriptor {
        name: "groups",
        since: 1,
        rebuilt_in: None,
        columns: COLUMNS,
        cascade: Some(CascadeTrigger {
            event_table: "group_map",
        }),
        view: Some(ViewDescriptor {
            name: "group_view",
            membership: Some(MembershipJoin {
                map_table: "group_map",
                count_column: "member_id",
                count_alias: "member_count",
            }),
        }),
        sharded: false,
    };

    #[test]
    fn table_includes_composite_unique() {
        let ddl = create_table(&GROUPS, "groups", 2);
        assert!(ddl.sql.starts_with("CREATE TABLE IF NOT EXISTS \"groups\" ("));
        assert!(ddl.sql.contains("\"group_id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(ddl.sql.contains("\"weight\" DOUBLE NOT NULL DEFAULT 0.0"));
        assert!(ddl.sql.contains("UNIQUE(\"name\", \"owner\")"));
    }

    #[test]
    fn unique_clause_widens_at_its_version() {
        const SHAPE: &[ColumnDescriptor] = &[
            ColumnDescriptor::text("path").unique(),
            ColumnDescriptor::text("owner").unique_since(3),
        ];
        let desc = TableDescriptor {
            name: "entries",
            since: 1,
            rebuilt_in: Some(3),
            columns: SHAPE,
            cascade: None,
            view: None,
            sharded: false,
        };
        assert!(create_table(&desc, "entries", 2).sql.contains("UNIQUE(\"path\")"));
        assert!(
            create_table(&desc, "entries", 3)
                .sql
                .contains("UNIQUE(\"path\", \"owner\")")
        );
    }

    #[test]
    fn older_version_omits_later_columns() {
        let ddl = create_table(&GROUPS, "groups", 1);
        assert!(!ddl.sql.contains("weight"));
        assert_eq!(GROUPS.max_version(), 2);
    }

    #[test]
    fn renders_indexes_per_physical_table() {
        let ddls = create_indexes(&GROUPS, "groups_b", 2);
        assert_eq!(ddls.len(), 1);
        assert_eq!(ddls[0].object, "idx_groups_b_owner");
        assert!(ddls[0].sql.contains("ON \"groups_b\" (\"owner\")"));
    }

    #[test]
    fn cascade_trigger_guards_on_remaining_members() {
        let ddl = cascade_trigger(&GROUPS).unwrap();
        assert_eq!(ddl.object, "cascade_groups_on_group_map");
        assert!(ddl.sql.contains("AFTER DELETE ON \"group_map\""));
        assert!(ddl.sql.contains(
            "WHEN (SELECT COUNT(*) FROM \"group_map\" WHERE \"group_id\" = OLD.\"group_id\") = 0"
        ));
        assert!(ddl.sql.contains("DELETE FROM \"groups\" WHERE \"group_id\" = OLD.\"group_id\""));
    }

    #[test]
    fn view_projects_visible_columns_with_count() {
        let ddl = create_view(&GROUPS, 2).unwrap();
        assert!(!ddl.sql.contains("secret"));
        assert!(ddl.sql.contains("COUNT(\"group_map\".\"member_id\") AS \"member_count\""));
        assert!(ddl.sql.contains("GROUP BY \"groups\".\"group_id\""));
    }

    #[test]
    fn add_column_keeps_default() {
        let weight = GROUPS.column("weight").unwrap();
        assert_eq!(
            add_column("groups", weight).sql,
            "ALTER TABLE \"groups\" ADD COLUMN \"weight\" DOUBLE NOT NULL DEFAULT 0.0"
        );
    }
}
