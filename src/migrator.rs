use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_ledger_tables::Migration),
            Box::new(m20240301_000002_create_cash_tables::Migration),
            Box::new(m20240301_000003_create_stock_tables::Migration),
            Box::new(m20240301_000004_create_inventory_count_tables::Migration),
            Box::new(m20240301_000005_create_numbering_tables::Migration),
            Box::new(m20240301_000006_create_audit_logs_table::Migration),
        ]
    }
}

fn money(col: impl IntoIden + 'static) -> ColumnDef {
    ColumnDef::new(col)
        .decimal_len(16, 4)
        .not_null()
        .default(0)
        .to_owned()
}

mod m20240301_000001_create_ledger_tables {
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LedgerDocuments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LedgerDocuments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerDocuments::TenantId).uuid().not_null())
                        .col(ColumnDef::new(LedgerDocuments::BranchId).uuid().null())
                        .col(ColumnDef::new(LedgerDocuments::Kind).string_len(16).not_null())
                        .col(
                            ColumnDef::new(LedgerDocuments::DocumentNumber)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerDocuments::DocumentType)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerDocuments::Category).string_len(24).null())
                        .col(
                            ColumnDef::new(LedgerDocuments::CounterpartyId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerDocuments::Description).string().null())
                        .col(ColumnDef::new(LedgerDocuments::Installment).integer().null())
                        .col(
                            ColumnDef::new(LedgerDocuments::InstallmentCount)
                                .integer()
                                .null(),
                        )
                        .col(ColumnDef::new(LedgerDocuments::IssueDate).date().not_null())
                        .col(ColumnDef::new(LedgerDocuments::DueDate).date().not_null())
                        .col(money(LedgerDocuments::OriginalAmount))
                        .col(money(LedgerDocuments::InterestAmount))
                        .col(money(LedgerDocuments::PenaltyAmount))
                        .col(money(LedgerDocuments::DiscountAmount))
                        .col(money(LedgerDocuments::TotalAmount))
                        .col(money(LedgerDocuments::Balance))
                        .col(money(LedgerDocuments::AmountSettled))
                        .col(money(LedgerDocuments::CreditAmount))
                        .col(ColumnDef::new(LedgerDocuments::Status).string_len(16).not_null())
                        .col(ColumnDef::new(LedgerDocuments::BankAccountId).uuid().null())
                        .col(ColumnDef::new(LedgerDocuments::SettledAt).date().null())
                        .col(ColumnDef::new(LedgerDocuments::CancelReason).string().null())
                        .col(
                            ColumnDef::new(LedgerDocuments::CanceledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(LedgerDocuments::Notes).text().null())
                        .col(ColumnDef::new(LedgerDocuments::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(LedgerDocuments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerDocuments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerDocuments::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_documents_tenant_kind_status")
                        .table(LedgerDocuments::Table)
                        .col(LedgerDocuments::TenantId)
                        .col(LedgerDocuments::Kind)
                        .col(LedgerDocuments::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_documents_due_date")
                        .table(LedgerDocuments::Table)
                        .col(LedgerDocuments::DueDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_documents_counterparty")
                        .table(LedgerDocuments::Table)
                        .col(LedgerDocuments::CounterpartyId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LedgerPostings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LedgerPostings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerPostings::TenantId).uuid().not_null())
                        .col(ColumnDef::new(LedgerPostings::DocumentId).uuid().not_null())
                        .col(money(LedgerPostings::RequestedAmount))
                        .col(money(LedgerPostings::AppliedAmount))
                        .col(money(LedgerPostings::ExcessAmount))
                        .col(money(LedgerPostings::InterestAmount))
                        .col(money(LedgerPostings::PenaltyAmount))
                        .col(money(LedgerPostings::DiscountAmount))
                        .col(money(LedgerPostings::NetAmount))
                        .col(money(LedgerPostings::BalanceBefore))
                        .col(money(LedgerPostings::BalanceAfter))
                        .col(ColumnDef::new(LedgerPostings::EffectiveDate).date().not_null())
                        .col(ColumnDef::new(LedgerPostings::BankAccountId).uuid().null())
                        .col(ColumnDef::new(LedgerPostings::OperatorId).uuid().not_null())
                        .col(ColumnDef::new(LedgerPostings::Note).string().null())
                        .col(
                            ColumnDef::new(LedgerPostings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ledger_postings_document_id")
                                .from(LedgerPostings::Table, LedgerPostings::DocumentId)
                                .to(LedgerDocuments::Table, LedgerDocuments::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_postings_document_id")
                        .table(LedgerPostings::Table)
                        .col(LedgerPostings::DocumentId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PostingBreakdowns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PostingBreakdowns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PostingBreakdowns::PostingId).uuid().not_null())
                        .col(ColumnDef::new(PostingBreakdowns::Position).integer().not_null())
                        .col(
                            ColumnDef::new(PostingBreakdowns::PaymentMethod)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(money(PostingBreakdowns::Amount))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_posting_breakdowns_posting_id")
                                .from(PostingBreakdowns::Table, PostingBreakdowns::PostingId)
                                .to(LedgerPostings::Table, LedgerPostings::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BankLedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BankLedgerEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BankLedgerEntries::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(BankLedgerEntries::BankAccountId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BankLedgerEntries::Direction)
                                .string_len(8)
                                .not_null(),
                        )
                        .col(money(BankLedgerEntries::Amount))
                        .col(ColumnDef::new(BankLedgerEntries::EntryDate).date().not_null())
                        .col(
                            ColumnDef::new(BankLedgerEntries::Category)
                                .string_len(24)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BankLedgerEntries::OriginType)
                                .string_len(24)
                                .not_null(),
                        )
                        .col(ColumnDef::new(BankLedgerEntries::OriginId).uuid().not_null())
                        .col(
                            ColumnDef::new(BankLedgerEntries::TraceTag)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(BankLedgerEntries::Description).string().not_null())
                        .col(
                            ColumnDef::new(BankLedgerEntries::Reconciled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(BankLedgerEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bank_ledger_entries_origin")
                        .table(BankLedgerEntries::Table)
                        .col(BankLedgerEntries::OriginType)
                        .col(BankLedgerEntries::OriginId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BankLedgerEntries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PostingBreakdowns::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LedgerPostings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LedgerDocuments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum LedgerDocuments {
        Table,
        Id,
        TenantId,
        BranchId,
        Kind,
        DocumentNumber,
        DocumentType,
        Category,
        CounterpartyId,
        Description,
        Installment,
        InstallmentCount,
        IssueDate,
        DueDate,
        OriginalAmount,
        InterestAmount,
        PenaltyAmount,
        DiscountAmount,
        TotalAmount,
        Balance,
        AmountSettled,
        CreditAmount,
        Status,
        BankAccountId,
        SettledAt,
        CancelReason,
        CanceledAt,
        Notes,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum LedgerPostings {
        Table,
        Id,
        TenantId,
        DocumentId,
        RequestedAmount,
        AppliedAmount,
        ExcessAmount,
        InterestAmount,
        PenaltyAmount,
        DiscountAmount,
        NetAmount,
        BalanceBefore,
        BalanceAfter,
        EffectiveDate,
        BankAccountId,
        OperatorId,
        Note,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PostingBreakdowns {
        Table,
        Id,
        PostingId,
        Position,
        PaymentMethod,
        Amount,
    }

    #[derive(DeriveIden)]
    enum BankLedgerEntries {
        Table,
        Id,
        TenantId,
        BankAccountId,
        Direction,
        Amount,
        EntryDate,
        Category,
        OriginType,
        OriginId,
        TraceTag,
        Description,
        Reconciled,
        CreatedAt,
    }
}

mod m20240301_000002_create_cash_tables {
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_cash_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Tills::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Tills::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Tills::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Tills::BranchId).uuid().null())
                        .col(ColumnDef::new(Tills::Name).string_len(120).not_null())
                        .col(ColumnDef::new(Tills::BankAccountId).uuid().null())
                        .col(ColumnDef::new(Tills::WithdrawalLimit).decimal_len(16, 4).null())
                        .col(
                            ColumnDef::new(Tills::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Tills::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Tills::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CashSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CashSessions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CashSessions::TenantId).uuid().not_null())
                        .col(ColumnDef::new(CashSessions::TillId).uuid().not_null())
                        .col(ColumnDef::new(CashSessions::OperatorId).uuid().not_null())
                        .col(ColumnDef::new(CashSessions::Status).string_len(16).not_null())
                        .col(money(CashSessions::OpeningAmount))
                        .col(ColumnDef::new(CashSessions::OpeningNote).string().null())
                        .col(
                            ColumnDef::new(CashSessions::OpenedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CashSessions::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(CashSessions::SystemAmount).decimal_len(16, 4).null())
                        .col(
                            ColumnDef::new(CashSessions::InformedAmount)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(CashSessions::Discrepancy).decimal_len(16, 4).null())
                        .col(ColumnDef::new(CashSessions::ClosingNote).string().null())
                        .col(
                            ColumnDef::new(CashSessions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cash_sessions_till_id")
                                .from(CashSessions::Table, CashSessions::TillId)
                                .to(Tills::Table, Tills::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            // One open session per till and per operator. Partial indexes are
            // not expressible through the index builder.
            let conn = manager.get_connection();
            conn.execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_cash_sessions_open_till \
                 ON cash_sessions (till_id) WHERE status = 'OPEN'",
            )
            .await?;
            conn.execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_cash_sessions_open_operator \
                 ON cash_sessions (tenant_id, operator_id) WHERE status = 'OPEN'",
            )
            .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CashMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CashMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CashMovements::TenantId).uuid().not_null())
                        .col(ColumnDef::new(CashMovements::SessionId).uuid().not_null())
                        .col(ColumnDef::new(CashMovements::Kind).string_len(16).not_null())
                        .col(ColumnDef::new(CashMovements::Direction).string_len(8).not_null())
                        .col(
                            ColumnDef::new(CashMovements::PaymentMethod)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(money(CashMovements::Amount))
                        .col(ColumnDef::new(CashMovements::Note).string().null())
                        .col(ColumnDef::new(CashMovements::Reference).string_len(64).null())
                        .col(
                            ColumnDef::new(CashMovements::DestinationBankAccountId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(CashMovements::OperatorId).uuid().not_null())
                        .col(
                            ColumnDef::new(CashMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cash_movements_session_id")
                                .from(CashMovements::Table, CashMovements::SessionId)
                                .to(CashSessions::Table, CashSessions::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cash_movements_session_id")
                        .table(CashMovements::Table)
                        .col(CashMovements::SessionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CashClosingLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CashClosingLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CashClosingLines::SessionId).uuid().not_null())
                        .col(
                            ColumnDef::new(CashClosingLines::PaymentMethod)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(money(CashClosingLines::SystemAmount))
                        .col(money(CashClosingLines::InformedAmount))
                        .col(money(CashClosingLines::Difference))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cash_closing_lines_session_id")
                                .from(CashClosingLines::Table, CashClosingLines::SessionId)
                                .to(CashSessions::Table, CashSessions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CashClosingLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CashMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CashSessions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Tills::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Tills {
        Table,
        Id,
        TenantId,
        BranchId,
        Name,
        BankAccountId,
        WithdrawalLimit,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CashSessions {
        Table,
        Id,
        TenantId,
        TillId,
        OperatorId,
        Status,
        OpeningAmount,
        OpeningNote,
        OpenedAt,
        ClosedAt,
        SystemAmount,
        InformedAmount,
        Discrepancy,
        ClosingNote,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CashMovements {
        Table,
        Id,
        TenantId,
        SessionId,
        Kind,
        Direction,
        PaymentMethod,
        Amount,
        Note,
        Reference,
        DestinationBankAccountId,
        OperatorId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum CashClosingLines {
        Table,
        Id,
        SessionId,
        PaymentMethod,
        SystemAmount,
        InformedAmount,
        Difference,
    }
}

mod m20240301_000003_create_stock_tables {
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Products::Sku).string_len(64).not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(ColumnDef::new(Products::BrandId).uuid().null())
                        .col(money(Products::CostPrice))
                        .col(
                            ColumnDef::new(Products::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_products_tenant_sku")
                        .table(Products::Table)
                        .col(Products::TenantId)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockLocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLocations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLocations::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockLocations::BranchId).uuid().null())
                        .col(ColumnDef::new(StockLocations::Name).string().not_null())
                        .col(
                            ColumnDef::new(StockLocations::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(StockLocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLevels::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::LocationId).uuid().not_null())
                        .col(money(StockLevels::Quantity))
                        .col(ColumnDef::new(StockLevels::AverageCost).decimal_len(16, 4).null())
                        .col(
                            ColumnDef::new(StockLevels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_levels_product_id")
                                .from(StockLevels::Table, StockLevels::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_levels_location_id")
                                .from(StockLevels::Table, StockLevels::LocationId)
                                .to(StockLocations::Table, StockLocations::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_stock_levels_product_location")
                        .table(StockLevels::Table)
                        .col(StockLevels::ProductId)
                        .col(StockLevels::LocationId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LocationId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::Direction).string_len(8).not_null())
                        .col(money(StockMovements::Quantity))
                        .col(ColumnDef::new(StockMovements::Reason).string_len(32).not_null())
                        .col(
                            ColumnDef::new(StockMovements::OriginType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::OriginId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::TraceTag).string_len(64).not_null())
                        .col(ColumnDef::new(StockMovements::UnitCost).decimal_len(16, 4).null())
                        .col(money(StockMovements::QuantityBefore))
                        .col(money(StockMovements::QuantityAfter))
                        .col(ColumnDef::new(StockMovements::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_origin")
                        .table(StockMovements::Table)
                        .col(StockMovements::OriginType)
                        .col(StockMovements::OriginId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        TenantId,
        Sku,
        Name,
        CategoryId,
        BrandId,
        CostPrice,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockLocations {
        Table,
        Id,
        TenantId,
        BranchId,
        Name,
        Active,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockLevels {
        Table,
        Id,
        TenantId,
        ProductId,
        LocationId,
        Quantity,
        AverageCost,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        TenantId,
        ProductId,
        LocationId,
        Direction,
        Quantity,
        Reason,
        OriginType,
        OriginId,
        TraceTag,
        UnitCost,
        QuantityBefore,
        QuantityAfter,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240301_000004_create_inventory_count_tables {
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_inventory_count_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryCounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryCounts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryCounts::TenantId).uuid().not_null())
                        .col(ColumnDef::new(InventoryCounts::BranchId).uuid().null())
                        .col(ColumnDef::new(InventoryCounts::Number).string_len(64).not_null())
                        .col(ColumnDef::new(InventoryCounts::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryCounts::CountType)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryCounts::Status).string_len(16).not_null())
                        .col(ColumnDef::new(InventoryCounts::ResponsibleId).uuid().not_null())
                        .col(ColumnDef::new(InventoryCounts::Description).string().null())
                        .col(
                            ColumnDef::new(InventoryCounts::StartedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryCounts::FinalizedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryCounts::AdjustedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryCounts::CanceledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryCounts::CancelReason).string().null())
                        .col(ColumnDef::new(InventoryCounts::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryCounts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryCounts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_counts_location_status")
                        .table(InventoryCounts::Table)
                        .col(InventoryCounts::LocationId)
                        .col(InventoryCounts::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_inventory_counts_active_location \
                     ON inventory_counts (location_id) WHERE status IN ('DRAFT', 'COUNTING')",
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryCountLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryCountLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryCountLines::CountId).uuid().not_null())
                        .col(ColumnDef::new(InventoryCountLines::ProductId).uuid().not_null())
                        .col(money(InventoryCountLines::SystemQuantity))
                        .col(money(InventoryCountLines::UnitCost))
                        .col(
                            ColumnDef::new(InventoryCountLines::CountedQuantity)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryCountLines::Difference)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryCountLines::Lot).string_len(64).null())
                        .col(ColumnDef::new(InventoryCountLines::ExpiryDate).date().null())
                        .col(ColumnDef::new(InventoryCountLines::Note).string().null())
                        .col(ColumnDef::new(InventoryCountLines::CountedBy).uuid().null())
                        .col(
                            ColumnDef::new(InventoryCountLines::CountedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryCountLines::Adjusted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InventoryCountLines::AdjustedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryCountLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_count_lines_count_id")
                                .from(InventoryCountLines::Table, InventoryCountLines::CountId)
                                .to(InventoryCounts::Table, InventoryCounts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_inventory_count_lines_count_product")
                        .table(InventoryCountLines::Table)
                        .col(InventoryCountLines::CountId)
                        .col(InventoryCountLines::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryCountLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryCounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryCounts {
        Table,
        Id,
        TenantId,
        BranchId,
        Number,
        LocationId,
        CountType,
        Status,
        ResponsibleId,
        Description,
        StartedAt,
        FinalizedAt,
        AdjustedAt,
        CanceledAt,
        CancelReason,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryCountLines {
        Table,
        Id,
        CountId,
        ProductId,
        SystemQuantity,
        UnitCost,
        CountedQuantity,
        Difference,
        Lot,
        ExpiryDate,
        Note,
        CountedBy,
        CountedAt,
        Adjusted,
        AdjustedAt,
        CreatedAt,
    }
}

mod m20240301_000005_create_numbering_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_numbering_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SequenceSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SequenceSettings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SequenceSettings::TenantId).uuid().not_null())
                        .col(ColumnDef::new(SequenceSettings::DocType).string_len(40).not_null())
                        .col(
                            ColumnDef::new(SequenceSettings::BranchScope)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SequenceSettings::Prefix)
                                .string_len(10)
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(SequenceSettings::Suffix)
                                .string_len(10)
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(SequenceSettings::Width)
                                .integer()
                                .not_null()
                                .default(6),
                        )
                        .col(
                            ColumnDef::new(SequenceSettings::StartAfter)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SequenceSettings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SequenceSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_sequence_settings_key")
                        .table(SequenceSettings::Table)
                        .col(SequenceSettings::TenantId)
                        .col(SequenceSettings::DocType)
                        .col(SequenceSettings::BranchScope)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AllocatedNumbers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AllocatedNumbers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AllocatedNumbers::TenantId).uuid().not_null())
                        .col(ColumnDef::new(AllocatedNumbers::DocType).string_len(40).not_null())
                        .col(
                            ColumnDef::new(AllocatedNumbers::BranchScope)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(ColumnDef::new(AllocatedNumbers::Number).big_integer().not_null())
                        .col(
                            ColumnDef::new(AllocatedNumbers::Formatted)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AllocatedNumbers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The allocator relies on this index to detect a lost race.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_allocated_numbers_key_number")
                        .table(AllocatedNumbers::Table)
                        .col(AllocatedNumbers::TenantId)
                        .col(AllocatedNumbers::DocType)
                        .col(AllocatedNumbers::BranchScope)
                        .col(AllocatedNumbers::Number)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AllocatedNumbers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SequenceSettings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SequenceSettings {
        Table,
        Id,
        TenantId,
        DocType,
        BranchScope,
        Prefix,
        Suffix,
        Width,
        StartAfter,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum AllocatedNumbers {
        Table,
        Id,
        TenantId,
        DocType,
        BranchScope,
        Number,
        Formatted,
        CreatedAt,
    }
}

mod m20240301_000006_create_audit_logs_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_audit_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditLogs::TenantId).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::UserId).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::Action).string_len(40).not_null())
                        .col(ColumnDef::new(AuditLogs::TableName).string_len(64).not_null())
                        .col(ColumnDef::new(AuditLogs::RecordId).uuid().null())
                        .col(ColumnDef::new(AuditLogs::Before).json().null())
                        .col(ColumnDef::new(AuditLogs::After).json().null())
                        .col(ColumnDef::new(AuditLogs::Ip).string_len(64).null())
                        .col(ColumnDef::new(AuditLogs::UserAgent).string().null())
                        .col(ColumnDef::new(AuditLogs::RequestId).string_len(128).null())
                        .col(
                            ColumnDef::new(AuditLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_logs_record")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::TenantId)
                        .col(AuditLogs::TableName)
                        .col(AuditLogs::RecordId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AuditLogs {
        Table,
        Id,
        TenantId,
        UserId,
        Action,
        TableName,
        RecordId,
        Before,
        After,
        Ip,
        UserAgent,
        RequestId,
        CreatedAt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::till;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};
    use uuid::Uuid;

    async fn memory_db() -> sea_orm::DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).min_connections(1);
        Database::connect(options).await.expect("connect sqlite")
    }

    #[tokio::test]
    async fn migrations_apply_and_roll_back_on_sqlite() {
        let db = memory_db().await;

        Migrator::up(&db, None).await.expect("migrate up");
        let applied = Migrator::get_applied_migrations(&db)
            .await
            .expect("applied migrations");
        assert_eq!(applied.len(), Migrator::migrations().len());

        Migrator::down(&db, None).await.expect("migrate down");
        assert!(Migrator::get_applied_migrations(&db)
            .await
            .expect("applied migrations")
            .is_empty());

        Migrator::up(&db, None).await.expect("migrate up again");
    }

    #[tokio::test]
    async fn money_columns_keep_four_decimal_places() {
        let db = memory_db().await;
        Migrator::up(&db, None).await.expect("migrate up");

        let now = Utc::now();
        let id = Uuid::new_v4();
        till::ActiveModel {
            id: Set(id),
            tenant_id: Set(Uuid::new_v4()),
            branch_id: Set(None),
            name: Set("Back office".to_string()),
            bank_account_id: Set(None),
            withdrawal_limit: Set(Some(dec!(4321.1234))),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&db)
        .await
        .expect("insert till");

        let stored = till::Entity::find_by_id(id)
            .one(&db)
            .await
            .expect("query till")
            .expect("till exists");
        assert_eq!(stored.withdrawal_limit, Some(dec!(4321.1234)));
    }
}
